//! Markdown/MDX extraction, structuring and versioning.
//!
//! A raw document flows through [`frontmatter`] splitting, tokenization and
//! [`parsing`] into blocks, [`assembly`] into a section tree, and ends up as
//! a [`DocumentModel`]. The [`VersionTracker`] records changed documents in a
//! [`Repository`], and the [`Exporter`] writes canonical text plus a JSON
//! sidecar.

pub mod assembly;
pub mod error;
pub mod export;
pub mod extract;
pub mod frontmatter;
pub mod hashing;
pub mod io;
pub mod models;
pub mod parsing;
pub mod pipeline;
pub mod repository;
pub mod slug;
pub mod versioning;

#[cfg(test)]
pub mod tests;

// Re-export key types for easier usage
pub use assembly::{TreeAssembler, assemble};
pub use error::{
    AssemblyError, DiffError, ExportError, ExtractError, ExtractionWarning, ReconcileError,
    RepositoryError,
};
pub use export::{DemoteStyle, ExportedPaths, Exporter, OutputFormat, Rendered};
pub use extract::{ExtractOptions, Extractor, extract};
pub use frontmatter::{Frontmatter, extract_frontmatter};
pub use hashing::{fingerprint, normalize};
pub use io::{IoError, SourceSet, discover_sources};
pub use models::*;
pub use parsing::{ParserPreset, PulldownTokenSource, TokenSource};
pub use pipeline::{BatchReport, DocumentReport, Pipeline, PipelineOptions, Status};
pub use repository::{FileRepository, MemoryRepository, Repository};
pub use slug::slugify;
pub use versioning::{DiffEngine, DiffSummary, VersionTracker};
