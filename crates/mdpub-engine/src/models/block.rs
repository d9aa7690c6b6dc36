use serde::Serialize;

/// The closed set of block kinds the model understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Heading,
    Paragraph,
    Code,
    List,
    Image,
    Table,
}

impl BlockKind {
    pub const ALL: [BlockKind; 6] = [
        BlockKind::Heading,
        BlockKind::Paragraph,
        BlockKind::Code,
        BlockKind::List,
        BlockKind::Image,
        BlockKind::Table,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Heading => "heading",
            Self::Paragraph => "paragraph",
            Self::Code => "code",
            Self::List => "list",
            Self::Image => "image",
            Self::Table => "table",
        }
    }
}

/// Kind-specific payload of a [`Block`].
///
/// Text fields hold inline markdown (emphasis, links and code spans are kept
/// as markup, literal punctuation is escaped).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockContent {
    Heading {
        text: String,
    },
    Paragraph {
        text: String,
    },
    Code {
        /// Fence info string; empty when unspecified or for indented code.
        language: String,
        /// Verbatim body, including its trailing newline.
        body: String,
    },
    /// A single list item. Its paragraphs, code and nested items are the
    /// block's children.
    List {
        /// Item number for ordered lists, `None` for bullets.
        number: Option<u64>,
    },
    Image {
        src: String,
        alt: String,
        title: String,
    },
    Table {
        header: Vec<String>,
        rows: Vec<Vec<String>>,
    },
}

/// A leaf content unit of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Block {
    #[serde(flatten)]
    pub content: BlockContent,
    /// Heading level for headings, 0 for every other kind.
    pub depth: u8,
    /// Nested blocks, only populated for list items.
    pub children: Vec<Block>,
}

impl Block {
    fn leaf(content: BlockContent) -> Self {
        Self {
            content,
            depth: 0,
            children: Vec::new(),
        }
    }

    pub fn heading(depth: u8, text: impl Into<String>) -> Self {
        Self {
            content: BlockContent::Heading { text: text.into() },
            depth,
            children: Vec::new(),
        }
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::leaf(BlockContent::Paragraph { text: text.into() })
    }

    pub fn code(language: impl Into<String>, body: impl Into<String>) -> Self {
        Self::leaf(BlockContent::Code {
            language: language.into(),
            body: body.into(),
        })
    }

    pub fn list_item(number: Option<u64>, children: Vec<Block>) -> Self {
        Self {
            content: BlockContent::List { number },
            depth: 0,
            children,
        }
    }

    pub fn image(src: impl Into<String>, alt: impl Into<String>, title: impl Into<String>) -> Self {
        Self::leaf(BlockContent::Image {
            src: src.into(),
            alt: alt.into(),
            title: title.into(),
        })
    }

    pub fn table(header: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self::leaf(BlockContent::Table { header, rows })
    }

    pub fn kind(&self) -> BlockKind {
        match self.content {
            BlockContent::Heading { .. } => BlockKind::Heading,
            BlockContent::Paragraph { .. } => BlockKind::Paragraph,
            BlockContent::Code { .. } => BlockKind::Code,
            BlockContent::List { .. } => BlockKind::List,
            BlockContent::Image { .. } => BlockKind::Image,
            BlockContent::Table { .. } => BlockKind::Table,
        }
    }

    pub fn is_heading(&self) -> bool {
        matches!(self.content, BlockContent::Heading { .. })
    }

    /// Inline text of headings and paragraphs.
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            BlockContent::Heading { text } | BlockContent::Paragraph { text } => Some(text),
            _ => None,
        }
    }

    /// Visit this block and every nested child, depth-first.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Block)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }

    /// Whitespace-separated words of prose content. Code is not counted.
    pub fn word_count(&self) -> usize {
        let own = match &self.content {
            BlockContent::Heading { text } | BlockContent::Paragraph { text } => {
                text.split_whitespace().count()
            }
            BlockContent::Table { header, rows } => header
                .iter()
                .chain(rows.iter().flatten())
                .map(|cell| cell.split_whitespace().count())
                .sum(),
            BlockContent::Image { alt, .. } => alt.split_whitespace().count(),
            BlockContent::Code { .. } | BlockContent::List { .. } => 0,
        };
        own + self.children.iter().map(Block::word_count).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_follows_content() {
        assert_eq!(Block::heading(2, "x").kind(), BlockKind::Heading);
        assert_eq!(Block::paragraph("x").kind(), BlockKind::Paragraph);
        assert_eq!(Block::code("rs", "fn x() {}\n").kind(), BlockKind::Code);
        assert_eq!(Block::list_item(None, vec![]).kind(), BlockKind::List);
        assert_eq!(Block::image("a.png", "", "").kind(), BlockKind::Image);
        assert_eq!(Block::table(vec![], vec![]).kind(), BlockKind::Table);
    }

    #[test]
    fn only_headings_carry_depth() {
        assert_eq!(Block::heading(3, "x").depth, 3);
        assert_eq!(Block::paragraph("x").depth, 0);
    }

    #[test]
    fn word_count_recurses_into_children_and_skips_code() {
        let item = Block::list_item(
            Some(1),
            vec![
                Block::paragraph("two words"),
                Block::code("", "not counted at all\n"),
                Block::list_item(None, vec![Block::paragraph("three more words")]),
            ],
        );
        assert_eq!(item.word_count(), 5);
    }

    #[test]
    fn serializes_with_kind_tag_first() {
        let value = serde_json::to_value(Block::heading(1, "Title")).unwrap();
        assert_eq!(
            value,
            json!({"kind": "heading", "text": "Title", "depth": 1, "children": []})
        );

        let text = serde_json::to_string(&Block::paragraph("p")).unwrap();
        assert!(text.starts_with(r#"{"kind":"paragraph""#));
    }
}
