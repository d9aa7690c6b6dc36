//! Folding the flat tokenizer event stream into typed [`Block`]s.
//!
//! # Event flow
//!
//! `pulldown-cmark` reports structure as balanced `Start`/`End` pairs:
//!
//! ```markdown
//! - Parent
//!   - Child
//! ```
//!
//! becomes `Start(List)`, `Start(Item)`, `Text("Parent")`, `Start(List)`,
//! `Start(Item)`, `Text("Child")`, `End(Item)`, `End(List)`, `End(Item)`,
//! `End(List)`. Nested lists arrive *inside* their parent item, so every open
//! construct is tracked on a single frame stack and finished blocks are
//! delivered to the innermost open list item (or to the top level).
//!
//! Tight list items carry their text without a surrounding paragraph; the
//! builder opens an implicit paragraph for such text so that item children
//! look the same whether the source list was tight or loose.

use pulldown_cmark::{CodeBlockKind, Event, LinkType, Tag, TagEnd};

use super::inline::{code_span, destination, push_escaped};
use crate::error::{AssemblyError, ExtractionWarning};
use crate::models::Block;

/// Output of a completed [`BlockBuilder`] run.
#[derive(Debug, Default)]
pub struct BuiltBlocks {
    pub blocks: Vec<Block>,
    pub warnings: Vec<ExtractionWarning>,
}

#[derive(Debug)]
struct ImageSpan {
    src: String,
    alt: String,
    title: String,
    start: usize,
    end: usize,
}

/// Inline markup accumulated for one paragraph, heading or table cell.
#[derive(Debug, Default)]
struct Inline {
    text: String,
    images: Vec<ImageSpan>,
    /// Opened for bare text in a tight list item, no `End` event will close it.
    implicit: bool,
}

#[derive(Debug)]
enum Frame {
    Paragraph(Inline),
    Heading {
        level: u8,
        inline: Inline,
    },
    Code {
        language: String,
        body: String,
    },
    List {
        next_number: Option<u64>,
    },
    Item {
        number: Option<u64>,
        children: Vec<Block>,
    },
    Table {
        header: Vec<String>,
        rows: Vec<Vec<String>>,
    },
    Row {
        head: bool,
        cells: Vec<String>,
    },
    Cell(Inline),
    Span {
        marker: &'static str,
    },
    Link {
        dest: String,
        title: String,
        autolink: bool,
    },
    Image {
        src: String,
        title: String,
        alt: String,
        start: usize,
    },
    /// A container the model has no kind for; its content still flows
    /// through to the enclosing context.
    Unsupported {
        element: &'static str,
    },
}

impl Frame {
    fn name(&self) -> String {
        match self {
            Frame::Paragraph(_) => "paragraph".into(),
            Frame::Heading { level, .. } => format!("heading {level}"),
            Frame::Code { .. } => "code block".into(),
            Frame::List { .. } => "list".into(),
            Frame::Item { .. } => "list item".into(),
            Frame::Table { .. } => "table".into(),
            Frame::Row { head: true, .. } => "table head".into(),
            Frame::Row { head: false, .. } => "table row".into(),
            Frame::Cell(_) => "table cell".into(),
            Frame::Span { marker } => format!("inline `{marker}`"),
            Frame::Link { .. } => "link".into(),
            Frame::Image { .. } => "image".into(),
            Frame::Unsupported { element } => (*element).into(),
        }
    }

    fn closes_with(&self, end: &TagEnd) -> bool {
        match self {
            Frame::Paragraph(_) => matches!(end, TagEnd::Paragraph),
            Frame::Heading { .. } => matches!(end, TagEnd::Heading(_)),
            Frame::Code { .. } => matches!(end, TagEnd::CodeBlock),
            Frame::List { .. } => matches!(end, TagEnd::List(_)),
            Frame::Item { .. } => matches!(end, TagEnd::Item),
            Frame::Table { .. } => matches!(end, TagEnd::Table),
            Frame::Row { head: true, .. } => matches!(end, TagEnd::TableHead),
            Frame::Row { head: false, .. } => matches!(end, TagEnd::TableRow),
            Frame::Cell(_) => matches!(end, TagEnd::TableCell),
            Frame::Span { .. } => matches!(
                end,
                TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough
            ),
            Frame::Link { .. } => matches!(end, TagEnd::Link),
            Frame::Image { .. } => matches!(end, TagEnd::Image),
            // Unsupported containers are opaque; any non-inline end closes them.
            Frame::Unsupported { .. } => !matches!(
                end,
                TagEnd::Paragraph
                    | TagEnd::Item
                    | TagEnd::List(_)
                    | TagEnd::Emphasis
                    | TagEnd::Strong
                    | TagEnd::Strikethrough
                    | TagEnd::Link
                    | TagEnd::Image
            ),
        }
    }

    fn inline_mut(&mut self) -> Option<&mut Inline> {
        match self {
            Frame::Paragraph(inline) | Frame::Cell(inline) | Frame::Heading { inline, .. } => {
                Some(inline)
            }
            _ => None,
        }
    }

    /// Frames that live inside a text target rather than holding one.
    fn is_inline_markup(&self) -> bool {
        matches!(
            self,
            Frame::Span { .. } | Frame::Link { .. } | Frame::Image { .. }
        )
    }
}

/// Converts tokenizer events into blocks, one [`push`](Self::push) at a time.
#[derive(Debug, Default)]
pub struct BlockBuilder {
    stack: Vec<Frame>,
    out: Vec<Block>,
    warnings: Vec<ExtractionWarning>,
}

impl BlockBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build blocks from a complete event stream.
    pub fn build<'a>(
        events: impl IntoIterator<Item = Event<'a>>,
    ) -> Result<BuiltBlocks, AssemblyError> {
        let mut builder = Self::new();
        for event in events {
            builder.push(event)?;
        }
        builder.finish()
    }

    pub fn push(&mut self, event: Event<'_>) -> Result<(), AssemblyError> {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(end) => return self.end(end),
            Event::Text(text) => self.text(&text),
            Event::Code(code) => {
                self.alt_text(&code);
                let span = code_span(&code);
                if self.in_cell() {
                    self.push_raw(&span.replace('|', "\\|"));
                } else {
                    self.push_raw(&span);
                }
            }
            Event::InlineHtml(html) => self.push_raw(&html),
            Event::Html(_) => {
                if !self.inside_unsupported("html block") {
                    self.unsupported("html");
                }
            }
            Event::SoftBreak => self.line_break("\n"),
            Event::HardBreak => self.line_break("\\\n"),
            Event::TaskListMarker(checked) => {
                self.push_raw(if checked { "[x] " } else { "[ ] " });
            }
            Event::FootnoteReference(name) => self.text(&format!("[^{name}]")),
            Event::Rule => {
                self.close_implicit();
                self.unsupported("thematic break");
            }
            Event::InlineMath(_) => self.unsupported("inline math"),
            Event::DisplayMath(_) => self.unsupported("display math"),
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<BuiltBlocks, AssemblyError> {
        self.close_implicit();
        if let Some(open) = self.stack.last() {
            return Err(AssemblyError::UnterminatedContainer {
                container: open.name(),
            });
        }
        Ok(BuiltBlocks {
            blocks: self.out,
            warnings: self.warnings,
        })
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => {
                self.close_implicit();
                self.stack.push(Frame::Paragraph(Inline::default()));
            }
            Tag::Heading { level, .. } => {
                self.close_implicit();
                self.stack.push(Frame::Heading {
                    level: level as u8,
                    inline: Inline::default(),
                });
            }
            Tag::CodeBlock(kind) => {
                self.close_implicit();
                let language = match kind {
                    CodeBlockKind::Fenced(info) => info.trim().to_string(),
                    CodeBlockKind::Indented => String::new(),
                };
                self.stack.push(Frame::Code {
                    language,
                    body: String::new(),
                });
            }
            Tag::List(start) => {
                self.close_implicit();
                self.stack.push(Frame::List { next_number: start });
            }
            Tag::Item => {
                let number = match self.stack.last_mut() {
                    Some(Frame::List { next_number }) => {
                        let current = *next_number;
                        *next_number = current.map(|n| n + 1);
                        current
                    }
                    _ => None,
                };
                self.stack.push(Frame::Item {
                    number,
                    children: Vec::new(),
                });
            }
            Tag::Table(_) => {
                self.close_implicit();
                self.stack.push(Frame::Table {
                    header: Vec::new(),
                    rows: Vec::new(),
                });
            }
            Tag::TableHead => self.stack.push(Frame::Row {
                head: true,
                cells: Vec::new(),
            }),
            Tag::TableRow => self.stack.push(Frame::Row {
                head: false,
                cells: Vec::new(),
            }),
            Tag::TableCell => self.stack.push(Frame::Cell(Inline::default())),
            Tag::Emphasis => self.open_span("*"),
            Tag::Strong => self.open_span("**"),
            Tag::Strikethrough => self.open_span("~~"),
            Tag::Link {
                link_type,
                dest_url,
                title,
                ..
            } => {
                let autolink = matches!(link_type, LinkType::Autolink | LinkType::Email);
                if autolink {
                    self.push_raw(&format!("<{dest_url}"));
                } else {
                    self.push_raw("[");
                }
                self.stack.push(Frame::Link {
                    dest: dest_url.to_string(),
                    title: title.to_string(),
                    autolink,
                });
            }
            Tag::Image {
                dest_url, title, ..
            } => {
                self.push_raw("![");
                let start = self.inline_mut().map_or(0, |inline| inline.text.len() - 2);
                self.stack.push(Frame::Image {
                    src: dest_url.to_string(),
                    title: title.to_string(),
                    alt: String::new(),
                    start,
                });
            }
            other => {
                self.close_implicit();
                let element = unsupported_name(&other);
                self.unsupported(element);
                self.stack.push(Frame::Unsupported { element });
            }
        }
    }

    fn end(&mut self, end: TagEnd) -> Result<(), AssemblyError> {
        self.close_implicit();
        let frame = self.stack.pop().ok_or_else(|| AssemblyError::UnexpectedClose {
            found: format!("{end:?}"),
        })?;
        if !frame.closes_with(&end) {
            return Err(AssemblyError::MismatchedClose {
                expected: frame.name(),
                found: format!("{end:?}"),
            });
        }

        match frame {
            Frame::Paragraph(inline) => self.finish_paragraph(inline),
            Frame::Heading { level, inline } => {
                self.emit(Block::heading(level, inline.text.trim()));
            }
            Frame::Code { language, body } => self.emit(Block::code(language, body)),
            Frame::List { .. } | Frame::Unsupported { .. } => {}
            Frame::Item { number, children } => self.emit(Block::list_item(number, children)),
            Frame::Table { header, rows } => self.emit(Block::table(header, rows)),
            Frame::Row { head, cells } => {
                if let Some(Frame::Table { header, rows }) = self.stack.last_mut() {
                    if head {
                        *header = cells;
                    } else {
                        rows.push(cells);
                    }
                }
            }
            Frame::Cell(inline) => {
                if let Some(Frame::Row { cells, .. }) = self.stack.last_mut() {
                    cells.push(inline.text.trim().to_string());
                }
            }
            Frame::Span { marker } => self.push_raw(marker),
            Frame::Link {
                dest,
                title,
                autolink,
            } => {
                if autolink {
                    self.push_raw(">");
                } else {
                    self.push_raw(&format!("]({})", destination(&dest, &title)));
                }
            }
            Frame::Image {
                src,
                title,
                alt,
                start,
            } => {
                self.push_raw(&format!("]({})", destination(&src, &title)));
                if let Some(inline) = self.inline_mut() {
                    let end = inline.text.len();
                    inline.images.push(ImageSpan {
                        src,
                        alt,
                        title,
                        start,
                        end,
                    });
                }
            }
        }
        Ok(())
    }

    fn finish_paragraph(&mut self, inline: Inline) {
        if let [image] = inline.images.as_slice()
            && inline.text[..image.start].trim().is_empty()
            && inline.text[image.end..].trim().is_empty()
        {
            let block = Block::image(image.src.clone(), image.alt.clone(), image.title.clone());
            self.emit(block);
            return;
        }

        let text = inline.text.trim();
        if !text.is_empty() {
            self.emit(Block::paragraph(text));
        }
    }

    /// Deliver a finished block to the innermost open list item, or the top level.
    fn emit(&mut self, block: Block) {
        let item = self.stack.iter_mut().rev().find_map(|frame| match frame {
            Frame::Item { children, .. } => Some(children),
            _ => None,
        });
        match item {
            Some(children) => children.push(block),
            None => self.out.push(block),
        }
    }

    fn text(&mut self, text: &str) {
        match self.stack.last_mut() {
            Some(Frame::Code { body, .. }) => {
                body.push_str(text);
                return;
            }
            Some(Frame::Link { autolink: true, .. }) => return,
            _ => {}
        }

        self.alt_text(text);
        if let Some(inline) = self.inline_mut() {
            push_escaped(&mut inline.text, text);
        }
    }

    /// Plain alt text for the innermost open image, if any.
    fn alt_text(&mut self, text: &str) {
        let image = self.stack.iter_mut().rev().find_map(|frame| match frame {
            Frame::Image { alt, .. } => Some(alt),
            _ => None,
        });
        if let Some(alt) = image {
            alt.push_str(text);
        }
    }

    fn push_raw(&mut self, markup: &str) {
        if let Some(inline) = self.inline_mut() {
            inline.text.push_str(markup);
        }
    }

    fn line_break(&mut self, markup: &str) {
        let single_line = self
            .stack
            .iter()
            .rev()
            .find(|frame| !frame.is_inline_markup())
            .is_some_and(|frame| matches!(frame, Frame::Heading { .. } | Frame::Cell(_)));
        if single_line {
            self.push_raw(" ");
        } else {
            self.push_raw(markup);
        }
    }

    /// Whether inline text currently lands in a table cell, where a bare `|`
    /// would end the cell.
    fn in_cell(&self) -> bool {
        self.stack
            .iter()
            .rev()
            .find(|frame| frame.inline_mut_ref().is_some())
            .is_some_and(|frame| matches!(frame, Frame::Cell(_)))
    }

    fn open_span(&mut self, marker: &'static str) {
        self.push_raw(marker);
        self.stack.push(Frame::Span { marker });
    }

    /// The current text target, opening an implicit paragraph when inline
    /// content shows up directly inside a container.
    fn inline_mut(&mut self) -> Option<&mut Inline> {
        let needs_paragraph = match self.stack.last() {
            Some(frame) => frame.inline_mut_ref().is_none() && !frame.is_inline_markup(),
            None => true,
        };
        if needs_paragraph {
            self.stack.push(Frame::Paragraph(Inline {
                implicit: true,
                ..Inline::default()
            }));
        }
        self.stack.iter_mut().rev().find_map(Frame::inline_mut)
    }

    fn close_implicit(&mut self) {
        if matches!(
            self.stack.last(),
            Some(Frame::Paragraph(Inline { implicit: true, .. }))
        ) && let Some(Frame::Paragraph(inline)) = self.stack.pop()
        {
            self.finish_paragraph(inline);
        }
    }

    fn inside_unsupported(&self, element: &str) -> bool {
        self.stack
            .iter()
            .any(|frame| matches!(frame, Frame::Unsupported { element: e } if *e == element))
    }

    fn unsupported(&mut self, element: &str) {
        log::debug!("dropping unsupported markdown element: {element}");
        self.warnings.push(ExtractionWarning::UnsupportedToken {
            element: element.to_string(),
        });
    }
}

impl Frame {
    fn inline_mut_ref(&self) -> Option<&Inline> {
        match self {
            Frame::Paragraph(inline) | Frame::Cell(inline) | Frame::Heading { inline, .. } => {
                Some(inline)
            }
            _ => None,
        }
    }
}

fn unsupported_name(tag: &Tag<'_>) -> &'static str {
    match tag {
        Tag::BlockQuote(_) => "block quote",
        Tag::HtmlBlock => "html block",
        Tag::FootnoteDefinition(_) => "footnote definition",
        Tag::DefinitionList | Tag::DefinitionListTitle | Tag::DefinitionListDefinition => {
            "definition list"
        }
        Tag::MetadataBlock(_) => "metadata block",
        _ => "unknown element",
    }
}
