pub mod block;
pub mod document;
pub mod section;
pub mod version;

pub use block::{Block, BlockContent, BlockKind};
pub use document::{DocumentModel, Metrics};
pub use section::{Section, SectionId, SectionTree};
pub use version::{DocumentVersion, Outcome};
