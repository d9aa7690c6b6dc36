use std::collections::BTreeMap;

use relative_path::{RelativePath, RelativePathBuf};
use serde::Serialize;

use super::block::{Block, BlockKind};
use super::section::SectionTree;
use crate::error::ExtractionWarning;
use crate::frontmatter::Frontmatter;

/// Counts derived from a section tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Metrics {
    /// Blocks per kind, list children included. Every kind is present.
    pub blocks: BTreeMap<BlockKind, usize>,
    pub words: usize,
    pub sections: usize,
    /// Deepest section level reached.
    pub max_depth: u8,
}

impl Metrics {
    pub fn compute(tree: &SectionTree) -> Self {
        let mut blocks: BTreeMap<BlockKind, usize> =
            BlockKind::ALL.iter().map(|&kind| (kind, 0)).collect();
        let mut words = 0;

        for block in tree.blocks() {
            words += block.word_count();
            block.walk(&mut |b: &Block| *blocks.entry(b.kind()).or_default() += 1);
        }

        Self {
            blocks,
            words,
            sections: tree.len() - 1,
            max_depth: tree.max_level(),
        }
    }

    pub fn total_blocks(&self) -> usize {
        self.blocks.values().sum()
    }
}

/// The structured result of extracting one document.
///
/// Built once per extraction and never mutated afterwards; a changed source
/// produces a new model.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentModel {
    path: RelativePathBuf,
    slug: String,
    frontmatter: Frontmatter,
    root: SectionTree,
    hash: String,
    metrics: Metrics,
    warnings: Vec<ExtractionWarning>,
}

impl DocumentModel {
    pub fn new(
        path: RelativePathBuf,
        slug: String,
        frontmatter: Frontmatter,
        root: SectionTree,
        hash: String,
        warnings: Vec<ExtractionWarning>,
    ) -> Self {
        let metrics = Metrics::compute(&root);
        Self {
            path,
            slug,
            frontmatter,
            root,
            hash,
            metrics,
            warnings,
        }
    }

    /// Source path relative to the scanned root; also the document identity.
    pub fn path(&self) -> &RelativePath {
        &self.path
    }

    pub fn identity(&self) -> &str {
        self.path.as_str()
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn frontmatter(&self) -> &Frontmatter {
        &self.frontmatter
    }

    pub fn root(&self) -> &SectionTree {
        &self.root
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn warnings(&self) -> &[ExtractionWarning] {
        &self.warnings
    }

    pub fn tags(&self) -> Vec<String> {
        self.frontmatter.tags()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SectionId;

    #[test]
    fn metrics_count_nested_blocks_and_words() {
        let mut tree = SectionTree::new();
        let a = tree.add_child(SectionId::ROOT, Block::heading(1, "Big title"), 1);
        let section = tree.get_mut(a).unwrap();
        section.blocks.push(Block::paragraph("one two three"));
        section.blocks.push(Block::list_item(
            None,
            vec![Block::paragraph("four"), Block::code("", "skip me\n")],
        ));

        let metrics = Metrics::compute(&tree);

        assert_eq!(metrics.blocks[&BlockKind::Heading], 1);
        assert_eq!(metrics.blocks[&BlockKind::Paragraph], 2);
        assert_eq!(metrics.blocks[&BlockKind::List], 1);
        assert_eq!(metrics.blocks[&BlockKind::Code], 1);
        assert_eq!(metrics.blocks[&BlockKind::Table], 0);
        assert_eq!(metrics.total_blocks(), 5);
        assert_eq!(metrics.words, 6);
        assert_eq!(metrics.sections, 1);
        assert_eq!(metrics.max_depth, 1);
    }

    #[test]
    fn metrics_serialize_kinds_as_keys() {
        let value = serde_json::to_value(Metrics::compute(&SectionTree::new())).unwrap();
        assert_eq!(value["blocks"]["paragraph"], 0);
        assert_eq!(value["max_depth"], 0);
    }
}
