//! Leading YAML metadata block detection and parsing.
//!
//! The block is parsed one top-level entry at a time so that a single bad
//! line never costs the rest of the metadata. Entries that do not parse are
//! kept verbatim under [`UNPARSED_KEY`].

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ExtractionWarning;

/// Key holding frontmatter lines that could not be parsed.
pub const UNPARSED_KEY: &str = "_unparsed";

const OPEN_DELIMITER: &str = "---";
const CLOSE_DELIMITERS: [&str; 2] = ["---", "..."];

static TOP_LEVEL_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s#\-].*?:(?:\s|$)").expect("static regex"));

/// Document metadata: string keys to scalar or list values.
///
/// Backed by an ordered map, so iteration (and therefore every rendering of
/// the metadata) is independent of source key order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Frontmatter(BTreeMap<String, Value>);

impl Frontmatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Insert a value; an existing value for the same key is replaced.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Explicit slug override, when the metadata carries a non-empty string.
    pub fn slug(&self) -> Option<&str> {
        self.0
            .get("slug")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Tags from the `tags` key, de-duplicated in first-seen order.
    ///
    /// Accepts either a list of strings or a comma-separated string.
    pub fn tags(&self) -> Vec<String> {
        let raw: Vec<String> = match self.0.get("tags") {
            Some(Value::String(s)) => s.split(',').map(|t| t.trim().to_string()).collect(),
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.trim().to_string()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };

        let mut tags: Vec<String> = Vec::new();
        for tag in raw {
            if !tag.is_empty() && !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        tags
    }
}

/// Result of splitting a raw document into metadata and body.
#[derive(Debug)]
pub struct SplitDocument<'a> {
    pub frontmatter: Frontmatter,
    /// Remaining text after the closing delimiter line.
    pub body: &'a str,
    /// Number of bytes of `raw` consumed by the metadata block.
    pub offset: usize,
    pub warnings: Vec<ExtractionWarning>,
}

/// Detect and parse a leading `---` delimited metadata block.
///
/// A document that does not start with the delimiter line has no
/// frontmatter and is returned unchanged.
pub fn extract_frontmatter(raw: &str) -> SplitDocument<'_> {
    let mut lines = raw.split_inclusive('\n');
    let Some(first) = lines
        .next()
        .filter(|first| first.trim_end() == OPEN_DELIMITER)
    else {
        return SplitDocument {
            frontmatter: Frontmatter::new(),
            body: raw,
            offset: 0,
            warnings: Vec::new(),
        };
    };

    let mut offset = first.len();
    let mut block: Vec<&str> = Vec::new();
    let mut closed = false;
    for line in lines {
        offset += line.len();
        if CLOSE_DELIMITERS.contains(&line.trim_end()) {
            closed = true;
            break;
        }
        block.push(line.trim_end_matches(['\n', '\r']));
    }

    if !closed {
        let mut frontmatter = Frontmatter::new();
        frontmatter.insert(UNPARSED_KEY, Value::String(block.join("\n")));
        return SplitDocument {
            frontmatter,
            body: "",
            offset: raw.len(),
            warnings: vec![ExtractionWarning::UnterminatedFrontmatter],
        };
    }

    let (frontmatter, warnings) = parse_block(&block);
    SplitDocument {
        frontmatter,
        body: &raw[offset..],
        offset,
        warnings,
    }
}

/// One top-level entry plus its continuation lines.
struct Entry<'a> {
    /// 1-based document line of the entry's first line.
    line: usize,
    lines: Vec<&'a str>,
}

fn parse_block(block: &[&str]) -> (Frontmatter, Vec<ExtractionWarning>) {
    let mut frontmatter = Frontmatter::new();
    let mut warnings = Vec::new();
    let mut unparsed: Vec<&str> = Vec::new();
    let mut entries: Vec<Entry> = Vec::new();

    for (idx, &line) in block.iter().enumerate() {
        // Line 1 is the opening delimiter.
        let line_no = idx + 2;
        let is_blank = line.trim().is_empty() || line.starts_with('#');

        if TOP_LEVEL_KEY.is_match(line) {
            entries.push(Entry {
                line: line_no,
                lines: vec![line],
            });
        } else if is_blank || line.starts_with([' ', '\t']) || line.starts_with("- ") {
            match entries.last_mut() {
                Some(entry) => entry.lines.push(line),
                None if is_blank => {}
                None => {
                    warnings.push(ExtractionWarning::MalformedFrontmatter {
                        line: line_no,
                        message: "continuation line without a key".to_string(),
                    });
                    unparsed.push(line);
                }
            }
        } else {
            warnings.push(ExtractionWarning::MalformedFrontmatter {
                line: line_no,
                message: "expected `key: value`".to_string(),
            });
            unparsed.push(line);
        }
    }

    for entry in entries {
        let text = entry.lines.join("\n");
        match parse_entry(&text) {
            Ok(pairs) => {
                for (key, value) in pairs {
                    frontmatter.insert(key, value);
                }
            }
            Err(message) => {
                warnings.push(ExtractionWarning::MalformedFrontmatter {
                    line: entry.line,
                    message,
                });
                unparsed.extend(entry.lines);
            }
        }
    }

    if !unparsed.is_empty() {
        frontmatter.insert(UNPARSED_KEY, Value::String(unparsed.join("\n")));
    }

    (frontmatter, warnings)
}

fn parse_entry(text: &str) -> Result<Vec<(String, Value)>, String> {
    let yaml: serde_yaml::Value = serde_yaml::from_str(text).map_err(|e| e.to_string())?;
    let serde_yaml::Value::Mapping(mapping) = yaml else {
        return Err("expected a mapping".to_string());
    };

    mapping
        .into_iter()
        .map(|(key, value)| {
            let key = match key {
                serde_yaml::Value::String(s) => s,
                other => return Err(format!("non-string key {other:?}")),
            };
            let value = serde_json::to_value(&value).map_err(|e| e.to_string())?;
            Ok((key, value))
        })
        .collect()
}
