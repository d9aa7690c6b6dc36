use serde::ser::{Serialize, SerializeStruct, Serializer};

use super::block::Block;

/// Index of a section inside its [`SectionTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SectionId(usize);

impl SectionId {
    pub const ROOT: SectionId = SectionId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

/// A heading-delimited region of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// The heading that opened this section; `None` only for the root.
    pub heading: Option<Block>,
    /// Nesting level: 0 for the root, otherwise the heading depth.
    pub level: u8,
    /// Non-heading content (and demoted headings) in source order.
    pub blocks: Vec<Block>,
    pub children: Vec<SectionId>,
}

impl Section {
    fn root() -> Self {
        Self {
            heading: None,
            level: 0,
            blocks: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.heading.as_ref().and_then(Block::text)
    }
}

/// Arena of sections. The root always exists at [`SectionId::ROOT`] and
/// every other section is reachable from it through `children`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionTree {
    sections: Vec<Section>,
}

impl Default for SectionTree {
    fn default() -> Self {
        Self::new()
    }
}

impl SectionTree {
    pub fn new() -> Self {
        Self {
            sections: vec![Section::root()],
        }
    }

    pub fn root(&self) -> &Section {
        &self.sections[SectionId::ROOT.0]
    }

    pub fn get(&self, id: SectionId) -> Option<&Section> {
        self.sections.get(id.0)
    }

    pub fn get_mut(&mut self, id: SectionId) -> Option<&mut Section> {
        self.sections.get_mut(id.0)
    }

    /// Add a child section under `parent`. Unknown parents fall back to the root.
    pub fn add_child(&mut self, parent: SectionId, heading: Block, level: u8) -> SectionId {
        let id = SectionId(self.sections.len());
        self.sections.push(Section {
            heading: Some(heading),
            level,
            blocks: Vec::new(),
            children: Vec::new(),
        });
        let parent = if parent.0 < id.0 { parent } else { SectionId::ROOT };
        self.sections[parent.0].children.push(id);
        id
    }

    pub fn children(&self, id: SectionId) -> impl Iterator<Item = (SectionId, &Section)> {
        self.get(id)
            .into_iter()
            .flat_map(|section| section.children.iter())
            .map(|&child| (child, &self.sections[child.0]))
    }

    /// Number of sections, root included.
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    /// True when the tree holds only the root.
    pub fn is_empty(&self) -> bool {
        self.sections.len() == 1
    }

    /// Deepest section level present; 0 when there are no headings.
    pub fn max_level(&self) -> u8 {
        self.sections.iter().map(|s| s.level).max().unwrap_or(0)
    }

    /// Sections in document order, paired with their id.
    pub fn iter(&self) -> impl Iterator<Item = (SectionId, &Section)> {
        let mut order = Vec::with_capacity(self.sections.len());
        self.collect_preorder(SectionId::ROOT, &mut order);
        order.into_iter().map(|id| (id, &self.sections[id.0]))
    }

    fn collect_preorder(&self, id: SectionId, order: &mut Vec<SectionId>) {
        order.push(id);
        for &child in &self.sections[id.0].children {
            self.collect_preorder(child, order);
        }
    }

    /// Every block in document order: each section's heading followed by its
    /// own blocks, then its children.
    pub fn blocks(&self) -> Vec<&Block> {
        self.iter()
            .flat_map(|(_, section)| section.heading.iter().chain(section.blocks.iter()))
            .collect()
    }

    /// Count of top-level blocks, headings included.
    pub fn block_count(&self) -> usize {
        self.sections
            .iter()
            .map(|s| s.blocks.len() + usize::from(s.heading.is_some()))
            .sum()
    }
}

/// Serializes as a nested `{heading, level, blocks, children}` object rooted
/// at the root section.
impl Serialize for SectionTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        SectionView {
            tree: self,
            id: SectionId::ROOT,
        }
        .serialize(serializer)
    }
}

struct SectionView<'a> {
    tree: &'a SectionTree,
    id: SectionId,
}

impl Serialize for SectionView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let section = &self.tree.sections[self.id.0];
        let children: Vec<SectionView> = section
            .children
            .iter()
            .map(|&id| SectionView {
                tree: self.tree,
                id,
            })
            .collect();

        let mut state = serializer.serialize_struct("Section", 4)?;
        state.serialize_field("heading", &section.heading)?;
        state.serialize_field("level", &section.level)?;
        state.serialize_field("blocks", &section.blocks)?;
        state.serialize_field("children", &children)?;
        state.end()
    }
}
