//! Folding a flat block sequence into a section tree.

use crate::models::{Block, SectionId, SectionTree};

/// Builds a [`SectionTree`] from blocks using heading levels.
///
/// Headings deeper than `max_nesting` never open a section. They are kept as
/// ordinary (demoted) heading blocks in the deepest open section, and the
/// content that follows keeps flowing there.
#[derive(Debug, Clone, Copy)]
pub struct TreeAssembler {
    max_nesting: u8,
}

impl TreeAssembler {
    pub fn new(max_nesting: u8) -> Self {
        Self { max_nesting }
    }

    pub fn max_nesting(&self) -> u8 {
        self.max_nesting
    }

    pub fn assemble(&self, blocks: impl IntoIterator<Item = Block>) -> SectionTree {
        let mut tree = SectionTree::new();
        // (id, level) of open sections; the root is never popped.
        let mut stack: Vec<(SectionId, u8)> = vec![(SectionId::ROOT, 0)];

        for block in blocks {
            let top = stack.last().map_or(SectionId::ROOT, |&(id, _)| id);

            if !block.is_heading() || block.depth > self.max_nesting || block.depth == 0 {
                if let Some(section) = tree.get_mut(top) {
                    section.blocks.push(block);
                }
                continue;
            }

            let depth = block.depth;
            while stack.len() > 1 && stack.last().is_some_and(|&(_, level)| level >= depth) {
                stack.pop();
            }
            let parent = stack.last().map_or(SectionId::ROOT, |&(id, _)| id);
            let id = tree.add_child(parent, block, depth);
            stack.push((id, depth));
        }

        tree
    }
}

/// Assemble `blocks` with the given cutoff.
pub fn assemble(blocks: impl IntoIterator<Item = Block>, max_nesting: u8) -> SectionTree {
    TreeAssembler::new(max_nesting).assemble(blocks)
}
