//! Markdown tokenization and block building.
//!
//! Tokenization is delegated to `pulldown-cmark`; the rest of the engine only
//! sees its flat event stream through the [`TokenSource`] seam, so the parser
//! can be swapped for tests or for another dialect.

pub mod blocks;
pub mod inline;

use std::fmt;
use std::str::FromStr;

use pulldown_cmark::{Event, Options, Parser, TextMergeStream};
use serde::{Deserialize, Serialize};

pub use blocks::{BlockBuilder, BuiltBlocks};

/// Named dialect rules for the tokenizer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParserPreset {
    /// Plain CommonMark, no extensions.
    Commonmark,
    /// CommonMark plus tables, strikethrough and task lists.
    #[default]
    GfmLike,
}

impl ParserPreset {
    pub fn name(self) -> &'static str {
        match self {
            Self::Commonmark => "commonmark",
            Self::GfmLike => "gfm-like",
        }
    }

    pub fn options(self) -> Options {
        match self {
            Self::Commonmark => Options::empty(),
            Self::GfmLike => {
                Options::ENABLE_TABLES
                    | Options::ENABLE_STRIKETHROUGH
                    | Options::ENABLE_TASKLISTS
            }
        }
    }
}

impl fmt::Display for ParserPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown parser preset `{0}` (expected `commonmark` or `gfm-like`)")]
pub struct UnknownPreset(pub String);

impl FromStr for ParserPreset {
    type Err = UnknownPreset;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "commonmark" => Ok(Self::Commonmark),
            "gfm-like" | "gfm" | "default" => Ok(Self::GfmLike),
            other => Err(UnknownPreset(other.to_string())),
        }
    }
}

/// Produces the flat, ordered markdown event stream for a document body.
pub trait TokenSource: Send + Sync {
    fn tokenize<'a>(&self, raw: &'a str, preset: ParserPreset) -> Vec<Event<'a>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PulldownTokenSource;

impl PulldownTokenSource {
    pub fn new() -> Self {
        Self
    }
}

impl TokenSource for PulldownTokenSource {
    fn tokenize<'a>(&self, raw: &'a str, preset: ParserPreset) -> Vec<Event<'a>> {
        // Backslash escapes split literal text into several events.
        TextMergeStream::new(Parser::new_ext(raw, preset.options())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulldown_cmark::{Tag, TagEnd};
    use rstest::rstest;

    #[rstest]
    #[case("commonmark", ParserPreset::Commonmark)]
    #[case("gfm-like", ParserPreset::GfmLike)]
    #[case("GFM-Like", ParserPreset::GfmLike)]
    #[case("default", ParserPreset::GfmLike)]
    fn preset_names_parse(#[case] name: &str, #[case] expected: ParserPreset) {
        assert_eq!(name.parse::<ParserPreset>().unwrap(), expected);
    }

    #[test]
    fn unknown_preset_is_rejected() {
        let err = "zero".parse::<ParserPreset>().unwrap_err();
        assert!(err.to_string().contains("zero"));
    }

    #[test]
    fn tables_only_tokenize_with_gfm_preset() {
        let md = "| a | b |\n| - | - |\n| 1 | 2 |\n";
        let source = PulldownTokenSource::new();

        let gfm = source.tokenize(md, ParserPreset::GfmLike);
        assert!(gfm.iter().any(|e| matches!(e, Event::Start(Tag::Table(_)))));

        let plain = source.tokenize(md, ParserPreset::Commonmark);
        assert!(!plain.iter().any(|e| matches!(e, Event::Start(Tag::Table(_)))));
        assert!(plain.iter().any(|e| matches!(e, Event::End(TagEnd::Paragraph))));
    }
}
