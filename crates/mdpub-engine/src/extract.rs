//! Raw text to [`DocumentModel`].

use std::path::Path;

use relative_path::RelativePath;

use crate::assembly::TreeAssembler;
use crate::error::{AssemblyError, ExtractError};
use crate::frontmatter::{Frontmatter, extract_frontmatter};
use crate::hashing::fingerprint;
use crate::io;
use crate::models::DocumentModel;
use crate::parsing::{BlockBuilder, ParserPreset, PulldownTokenSource, TokenSource};
use crate::slug::slugify;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractOptions {
    pub max_nesting: u8,
    pub preset: ParserPreset,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            max_nesting: 6,
            preset: ParserPreset::default(),
        }
    }
}

/// Runs frontmatter splitting, tokenization, block building and tree
/// assembly for one document at a time.
#[derive(Debug, Clone, Default)]
pub struct Extractor<S = PulldownTokenSource> {
    source: S,
    options: ExtractOptions,
}

impl Extractor<PulldownTokenSource> {
    pub fn new(options: ExtractOptions) -> Self {
        Self::with_source(PulldownTokenSource, options)
    }
}

impl<S: TokenSource> Extractor<S> {
    pub fn with_source(source: S, options: ExtractOptions) -> Self {
        Self { source, options }
    }

    pub fn options(&self) -> ExtractOptions {
        self.options
    }

    /// Extract a document from its raw text.
    ///
    /// `path` is the source location relative to the scanned root and becomes
    /// the document identity.
    pub fn extract(&self, path: &RelativePath, raw: &str) -> Result<DocumentModel, AssemblyError> {
        let split = extract_frontmatter(raw);
        let hash = fingerprint(split.body);

        let events = self.source.tokenize(split.body, self.options.preset);
        let built = BlockBuilder::build(events)?;
        let tree = TreeAssembler::new(self.options.max_nesting).assemble(built.blocks);

        let mut warnings = split.warnings;
        warnings.extend(built.warnings);
        for warning in &warnings {
            log::warn!("{path}: {warning}");
        }

        let slug = derive_slug(path, &split.frontmatter);
        let model = DocumentModel::new(
            path.to_relative_path_buf(),
            slug,
            split.frontmatter,
            tree,
            hash,
            warnings,
        );
        log::debug!(
            "extracted {path}: {} blocks, {} sections, hash {}",
            model.metrics().total_blocks(),
            model.metrics().sections,
            &model.hash()[..12]
        );
        Ok(model)
    }

    /// Read `path` under `root` and extract it.
    pub fn extract_file(
        &self,
        path: &RelativePath,
        root: &Path,
    ) -> Result<DocumentModel, ExtractError> {
        let raw = io::read_file(path, root)?;
        Ok(self.extract(path, &raw)?)
    }
}

/// URL-safe identifier: the frontmatter `slug` when present, otherwise the
/// source file stem, slugified either way.
pub fn derive_slug(path: &RelativePath, frontmatter: &Frontmatter) -> String {
    let base = frontmatter
        .slug()
        .or_else(|| path.file_stem())
        .unwrap_or_default();
    slugify(base)
}

/// Extract with the default tokenizer.
pub fn extract(
    path: &RelativePath,
    raw: &str,
    options: ExtractOptions,
) -> Result<DocumentModel, AssemblyError> {
    Extractor::new(options).extract(path, raw)
}
