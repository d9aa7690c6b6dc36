//! Canonical Markdown/MDX rendering and the JSON metadata sidecar.
//!
//! Rendering is deterministic: the same model always produces the same
//! bytes, and extracting the rendered text yields a model that renders to
//! the same text again.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use relative_path::RelativePathBuf;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ExportError;
use crate::frontmatter::Frontmatter;
use crate::io;
use crate::models::{Block, BlockContent, DocumentModel, DocumentVersion, Metrics, SectionTree};
use crate::parsing::inline::{destination, escape, longest_run};

/// Keys the exporter derives and writes after the source frontmatter.
const DERIVED_KEYS: [&str; 4] = ["slug", "doc_id", "hash", "tags"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Md,
    #[default]
    Mdx,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Md => "md",
            Self::Mdx => "mdx",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "md" | "markdown" => Ok(Self::Md),
            "mdx" => Ok(Self::Mdx),
            other => Err(UnknownVariant {
                what: "output format",
                value: other.to_string(),
                expected: "`md` or `mdx`",
            }),
        }
    }
}

/// How headings deeper than the nesting cutoff are written back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DemoteStyle {
    /// Keep the original `#` markers.
    #[default]
    Heading,
    /// Write the heading text as a bold paragraph.
    Bold,
}

impl FromStr for DemoteStyle {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "heading" => Ok(Self::Heading),
            "bold" => Ok(Self::Bold),
            other => Err(UnknownVariant {
                what: "demote style",
                value: other.to_string(),
                expected: "`heading` or `bold`",
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {what} `{value}` (expected {expected})")]
pub struct UnknownVariant {
    what: &'static str,
    value: String,
    expected: &'static str,
}

/// Canonical text plus JSON sidecar for one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub text: String,
    pub json: String,
}

/// Where [`Exporter::write`] put a document's artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedPaths {
    pub document: PathBuf,
    pub sidecar: PathBuf,
}

#[derive(Serialize)]
struct Sidecar<'a> {
    slug: &'a str,
    doc_id: Option<Uuid>,
    hash: &'a str,
    frontmatter: &'a Frontmatter,
    blocks: &'a SectionTree,
    metrics: &'a Metrics,
    versions: Vec<VersionEntry>,
}

#[derive(Serialize, Deserialize)]
struct VersionEntry {
    version_number: u32,
    hash: String,
    created_at: DateTime<Utc>,
}

/// The part of a previously written sidecar needed to tell whether it is
/// current.
#[derive(Deserialize)]
struct WrittenSidecar {
    versions: Vec<VersionEntry>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Exporter {
    format: OutputFormat,
    demote_style: DemoteStyle,
}

impl Exporter {
    pub fn new(format: OutputFormat, demote_style: DemoteStyle) -> Self {
        Self {
            format,
            demote_style,
        }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Full artifacts for `model`. The document id and version list come
    /// from its stored history, which may be empty.
    pub fn render(
        &self,
        model: &DocumentModel,
        versions: &[DocumentVersion],
    ) -> Result<Rendered, ExportError> {
        let doc_id = versions.last().map(|v| v.document_id);
        Ok(Rendered {
            text: self.render_text(model, doc_id)?,
            json: self.sidecar(model, versions)?,
        })
    }

    /// Metadata block followed by the body.
    pub fn render_text(
        &self,
        model: &DocumentModel,
        doc_id: Option<Uuid>,
    ) -> Result<String, ExportError> {
        let merged = self.merged_frontmatter(model, doc_id)?;
        let yaml = serde_yaml::to_string(&merged)?;
        let body = self.render_body(model);

        let mut text = format!("---\n{yaml}---\n");
        if !body.is_empty() {
            text.push('\n');
            text.push_str(&body);
        }
        Ok(text)
    }

    /// Source frontmatter (sorted) followed by the derived fields.
    pub fn merged_frontmatter(
        &self,
        model: &DocumentModel,
        doc_id: Option<Uuid>,
    ) -> Result<serde_yaml::Mapping, ExportError> {
        let mut merged = serde_yaml::Mapping::new();
        for (key, value) in model.frontmatter().iter() {
            if !DERIVED_KEYS.contains(&key.as_str()) {
                merged.insert(key.as_str().into(), serde_yaml::to_value(value)?);
            }
        }

        merged.insert("slug".into(), model.slug().into());
        if let Some(id) = doc_id {
            merged.insert("doc_id".into(), id.to_string().into());
        }
        merged.insert("hash".into(), model.hash().into());
        let tags = model.tags();
        if !tags.is_empty() {
            merged.insert("tags".into(), serde_yaml::to_value(&tags)?);
        }
        Ok(merged)
    }

    /// Pretty JSON sidecar with a fixed key order.
    pub fn sidecar(
        &self,
        model: &DocumentModel,
        versions: &[DocumentVersion],
    ) -> Result<String, ExportError> {
        let sidecar = Sidecar {
            slug: model.slug(),
            doc_id: versions.last().map(|v| v.document_id),
            hash: model.hash(),
            frontmatter: model.frontmatter(),
            blocks: model.root(),
            metrics: model.metrics(),
            versions: versions
                .iter()
                .map(|v| VersionEntry {
                    version_number: v.version_number,
                    hash: v.hash.clone(),
                    created_at: v.created_at,
                })
                .collect(),
        };
        Ok(serde_json::to_string_pretty(&sidecar)?)
    }

    /// The section tree as canonical markdown, without frontmatter. This is
    /// the snapshot stored on each version.
    pub fn render_body(&self, model: &DocumentModel) -> String {
        self.render_tree(model.root())
    }

    pub fn render_tree(&self, tree: &SectionTree) -> String {
        let mut chunks = Vec::new();
        for (_, section) in tree.iter() {
            if let Some(heading) = &section.heading {
                chunks.push(heading_line(section.level, heading.text().unwrap_or_default()));
            }
            self.render_blocks(&section.blocks, &mut chunks);
        }

        if chunks.is_empty() {
            return String::new();
        }
        let mut body = chunks.join("\n\n");
        body.push('\n');
        body
    }

    /// Output paths relative to the export root: the source's parent
    /// directory plus `<slug>.<ext>` and `<slug>.json`.
    pub fn artifact_paths(&self, model: &DocumentModel) -> (RelativePathBuf, RelativePathBuf) {
        let dir = model
            .path()
            .parent()
            .map(|p| p.to_relative_path_buf())
            .unwrap_or_else(RelativePathBuf::new);
        (
            dir.join(format!("{}.{}", model.slug(), self.format.extension())),
            dir.join(format!("{}.json", model.slug())),
        )
    }

    /// Render and write both artifacts under `out_dir`.
    pub fn write(
        &self,
        model: &DocumentModel,
        versions: &[DocumentVersion],
        out_dir: &Path,
    ) -> Result<ExportedPaths, ExportError> {
        let rendered = self.render(model, versions)?;
        let (document, sidecar) = self.artifact_paths(model);

        io::write_file(&document, out_dir, &rendered.text)?;
        io::write_file(&sidecar, out_dir, &rendered.json)?;
        log::debug!("exported {} to {}", model.path(), out_dir.display());

        Ok(ExportedPaths {
            document: document.to_path(out_dir),
            sidecar: sidecar.to_path(out_dir),
        })
    }

    /// Latest version number recorded by the artifacts already under
    /// `out_dir`, or `None` when either file is missing or unreadable.
    ///
    /// The sidecar is written last, so a version it records was exported in
    /// full.
    pub fn exported_version(&self, model: &DocumentModel, out_dir: &Path) -> Option<u32> {
        let (document, sidecar) = self.artifact_paths(model);
        if !document.to_path(out_dir).is_file() {
            return None;
        }
        let json = io::read_file(&sidecar, out_dir).ok()?;
        let written: WrittenSidecar = serde_json::from_str(&json).ok()?;
        written.versions.iter().map(|v| v.version_number).max()
    }

    fn render_blocks(&self, blocks: &[Block], chunks: &mut Vec<String>) {
        let mut rest = blocks;
        while let Some(first) = rest.first() {
            if let BlockContent::List { number } = first.content {
                // Consecutive items with the same marker kind form one list.
                let len = rest
                    .iter()
                    .take_while(|b| {
                        matches!(b.content, BlockContent::List { number: n } if n.is_some() == number.is_some())
                    })
                    .count();
                chunks.push(self.render_list(&rest[..len], number));
                rest = &rest[len..];
            } else {
                chunks.push(self.render_block(first));
                rest = &rest[1..];
            }
        }
    }

    fn render_list(&self, items: &[Block], start: Option<u64>) -> String {
        let mut lines = Vec::new();
        for (idx, item) in items.iter().enumerate() {
            let marker = match start {
                Some(start) => format!("{}. ", start + idx as u64),
                None => "- ".to_string(),
            };

            let mut children = Vec::new();
            self.render_blocks(&item.children, &mut children);
            let content = children.join("\n\n");
            if content.is_empty() {
                lines.push(marker.trim_end().to_string());
                continue;
            }

            let indent = " ".repeat(marker.len());
            for (n, line) in content.lines().enumerate() {
                lines.push(if n == 0 {
                    format!("{marker}{line}")
                } else if line.is_empty() {
                    String::new()
                } else {
                    format!("{indent}{line}")
                });
            }
        }
        lines.join("\n")
    }

    fn render_block(&self, block: &Block) -> String {
        match &block.content {
            BlockContent::Heading { text } => match self.demote_style {
                DemoteStyle::Heading => heading_line(block.depth, text),
                DemoteStyle::Bold => format!("**{text}**"),
            },
            BlockContent::Paragraph { text } => text.clone(),
            BlockContent::Code { language, body } => code_fence(language, body),
            BlockContent::List { number } => {
                self.render_list(std::slice::from_ref(block), *number)
            }
            BlockContent::Image { src, alt, title } => {
                format!("![{}]({})", escape(alt), destination(src, title))
            }
            BlockContent::Table { header, rows } => table(header, rows),
        }
    }
}

fn heading_line(level: u8, text: &str) -> String {
    let marker = "#".repeat(usize::from(level.max(1)));
    if text.is_empty() {
        return marker;
    }
    // A trailing `#` run would be read back as a closing sequence.
    let text = match text.trim_end_matches('#') {
        kept if kept.len() < text.len() && !kept.ends_with('\\') => {
            format!("{kept}\\{}", &text[kept.len()..])
        }
        _ => text.to_string(),
    };
    format!("{marker} {text}")
}

fn code_fence(language: &str, body: &str) -> String {
    let fence_char = if language.contains('`') { '~' } else { '`' };
    let fence = fence_char
        .to_string()
        .repeat((longest_run(body, fence_char) + 1).max(3));

    let mut out = format!("{fence}{language}\n{body}");
    if !body.is_empty() && !body.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(&fence);
    out
}

fn table(header: &[String], rows: &[Vec<String>]) -> String {
    let row = |cells: &[String]| {
        let cells: Vec<&str> = (0..header.len())
            .map(|i| cells.get(i).map_or("", String::as_str))
            .collect();
        format!("| {} |", cells.join(" | "))
    };

    let mut lines = vec![row(header), format!("|{}", " --- |".repeat(header.len()))];
    lines.extend(rows.iter().map(|cells| row(cells)));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{ExtractOptions, extract};
    use crate::models::{SectionId, SectionTree};
    use insta::assert_snapshot;
    use pretty_assertions::assert_eq;
    use relative_path::RelativePath;
    use rstest::rstest;
    use serde_json::Value;

    fn model(raw: &str) -> DocumentModel {
        extract(RelativePath::new("docs/page.md"), raw, ExtractOptions::default()).unwrap()
    }

    fn body(raw: &str) -> String {
        Exporter::default().render_body(&model(raw))
    }

    #[test]
    fn renders_canonical_body() {
        let raw = "Intro text\n\nSetext Title\n============\n\n* one\n* two\n\n```rust\nfn x() {}\n```\n\n### Deep   \n";
        assert_snapshot!(body(raw), @r"
        Intro text

        # Setext Title

        - one
        - two

        ```rust
        fn x() {}
        ```

        ### Deep
        ");
    }

    #[test]
    fn renders_nested_lists_with_marker_indent() {
        let raw = "3. first\n   - nested\n\n     more\n4. second\n";
        assert_eq!(
            body(raw),
            "3. first\n\n   - nested\n\n     more\n4. second\n"
        );
    }

    #[test]
    fn renders_tables_and_images() {
        let raw = "| a | b |\n|:--|--:|\n| 1 | 2 |\n\n![Alt *text*](img/x.png \"T\")\n";
        assert_eq!(
            body(raw),
            "| a | b |\n| --- | --- |\n| 1 | 2 |\n\n![Alt text](img/x.png \"T\")\n"
        );
    }

    #[rstest]
    #[case("```\nlet a = \"```\";\n```\n", "````\nlet a = \"```\";\n````\n")]
    #[case("    indented\n", "```\nindented\n```\n")]
    #[case("```\n```\n", "```\n```\n")]
    fn code_fences(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(body(raw), expected);
    }

    #[test]
    fn empty_document_renders_empty_body() {
        assert_eq!(body(""), "");
    }

    #[test]
    fn demoted_headings_follow_style() {
        let mut tree = SectionTree::new();
        let a = tree.add_child(SectionId::ROOT, Block::heading(1, "A"), 1);
        tree.get_mut(a).unwrap().blocks.push(Block::heading(4, "Deep"));

        let heading = Exporter::new(OutputFormat::Md, DemoteStyle::Heading).render_tree(&tree);
        let bold = Exporter::new(OutputFormat::Md, DemoteStyle::Bold).render_tree(&tree);

        assert_eq!(heading, "# A\n\n#### Deep\n");
        assert_eq!(bold, "# A\n\n**Deep**\n");
    }

    #[test]
    fn trailing_hashes_in_heading_text_survive() {
        assert_eq!(heading_line(2, "C#"), "## C\\#");
        assert_eq!(heading_line(1, "plain"), "# plain");
        assert_eq!(heading_line(3, ""), "###");
    }

    #[test]
    fn frontmatter_merges_derived_fields_after_source_keys() {
        let model = model("---\ntitle: Hello\nslug: Custom\ntags: [b, a, b]\nauthor: me\n---\n# Hi\n");

        let text = Exporter::default()
            .render_text(&model, Some(Uuid::new_v4()))
            .unwrap();

        assert!(text.starts_with("---\nauthor: me\ntitle: Hello\nslug: custom\ndoc_id: "));
        assert!(text.ends_with("tags:\n- b\n- a\n---\n\n# Hi\n"));
        let doc_id = text.find("\ndoc_id: ").unwrap();
        let hash = text.find("\nhash: ").unwrap();
        assert!(doc_id < hash);
        assert!(text.contains(model.hash()));
    }

    #[test]
    fn sidecar_keys_are_in_fixed_order() {
        let model = model("---\ntitle: T\n---\n# Hi\n\nBody words here.\n");
        let v1 = DocumentVersion::first(model.hash(), "x");

        let json = Exporter::default().sidecar(&model, &[v1.clone()]).unwrap();

        let positions: Vec<usize> = [
            "\"slug\"",
            "\"doc_id\"",
            "\"hash\"",
            "\"frontmatter\"",
            "\"blocks\"",
            "\"metrics\"",
            "\"versions\"",
        ]
        .iter()
        .map(|key| json.find(key).unwrap())
        .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));

        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["doc_id"], v1.document_id.to_string());
        assert_eq!(value["versions"][0]["version_number"], 1);
        assert_eq!(value["blocks"]["children"][0]["heading"]["text"], "Hi");
        assert_eq!(value["metrics"]["words"], 4);
    }

    #[test]
    fn artifacts_mirror_source_directory() {
        let model = model("# Page\n");
        let (doc, json) = Exporter::new(OutputFormat::Md, DemoteStyle::Heading).artifact_paths(&model);
        assert_eq!(doc.as_str(), "docs/page.md");
        assert_eq!(json.as_str(), "docs/page.json");
    }

    #[test]
    fn write_creates_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let model = model("# Page\n");

        let paths = Exporter::default().write(&model, &[], dir.path()).unwrap();

        assert_eq!(paths.document, dir.path().join("docs/page.mdx"));
        let text = std::fs::read_to_string(&paths.document).unwrap();
        assert!(text.starts_with("---\nslug: page\n"));
        assert!(text.ends_with("\n# Page\n"));
        assert!(paths.sidecar.is_file());
    }

    #[test]
    fn exported_version_reads_the_written_sidecar() {
        // Given a document exported at version 1
        let dir = tempfile::tempdir().unwrap();
        let model = model("# Page\n");
        let exporter = Exporter::default();
        let v1 = DocumentVersion::first(model.hash(), "x");
        assert_eq!(exporter.exported_version(&model, dir.path()), None);
        let paths = exporter.write(&model, &[v1], dir.path()).unwrap();

        // When reading it back
        let version = exporter.exported_version(&model, dir.path());

        // Then the sidecar reports it, until the document goes missing
        assert_eq!(version, Some(1));
        std::fs::remove_file(&paths.document).unwrap();
        assert_eq!(exporter.exported_version(&model, dir.path()), None);
    }

    #[test]
    fn exported_version_ignores_a_garbled_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let model = model("# Page\n");
        let exporter = Exporter::default();
        let paths = exporter.write(&model, &[], dir.path()).unwrap();
        std::fs::write(&paths.sidecar, "{ not json").unwrap();

        assert_eq!(exporter.exported_version(&model, dir.path()), None);
    }

    #[rstest]
    #[case("md", OutputFormat::Md)]
    #[case("MDX", OutputFormat::Mdx)]
    #[case("markdown", OutputFormat::Md)]
    fn output_format_parses(#[case] input: &str, #[case] expected: OutputFormat) {
        assert_eq!(input.parse::<OutputFormat>().unwrap(), expected);
    }

    #[test]
    fn unknown_variants_are_rejected() {
        assert!("html".parse::<OutputFormat>().is_err());
        let err = "italic".parse::<DemoteStyle>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "unknown demote style `italic` (expected `heading` or `bold`)"
        );
    }
}
