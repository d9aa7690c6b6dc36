//! Line diffs between rendered version snapshots.
//!
//! Lines are matched with a longest-common-subsequence table, then grouped
//! into unified-diff hunks with a fixed number of context lines.

use serde::Serialize;

use crate::error::DiffError;
use crate::models::DocumentVersion;
use crate::repository::Repository;

pub const DEFAULT_CONTEXT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineOp {
    Equal,
    Delete,
    Insert,
}

impl LineOp {
    fn prefix(self) -> char {
        match self {
            LineOp::Equal => ' ',
            LineOp::Delete => '-',
            LineOp::Insert => '+',
        }
    }
}

/// One line of an edit script, with its position in both inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Edit<'a> {
    op: LineOp,
    text: &'a str,
    old_pos: usize,
    new_pos: usize,
}

/// Line counts of an edit script.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffSummary {
    pub added: usize,
    pub deleted: usize,
    pub unchanged: usize,
}

/// LCS edit script turning `old` into `new`. Deletions come before
/// insertions within a changed run.
fn edits<'a>(old: &[&'a str], new: &[&'a str]) -> Vec<Edit<'a>> {
    let (n, m) = (old.len(), new.len());
    // lcs[i][j] = LCS length of old[i..] and new[j..]
    let mut lcs = vec![vec![0u32; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if old[i] == new[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut script = Vec::with_capacity(n.max(m));
    let (mut i, mut j) = (0, 0);
    while i < n || j < m {
        let (old_pos, new_pos) = (i, j);
        let edit = move |op, text| Edit {
            op,
            text,
            old_pos,
            new_pos,
        };
        if i < n && j < m && old[i] == new[j] {
            script.push(edit(LineOp::Equal, old[i]));
            i += 1;
            j += 1;
        } else if i < n && (j == m || lcs[i + 1][j] >= lcs[i][j + 1]) {
            script.push(edit(LineOp::Delete, old[i]));
            i += 1;
        } else {
            script.push(edit(LineOp::Insert, new[j]));
            j += 1;
        }
    }
    script
}

/// `start,count` as printed in a hunk header.
fn hunk_range(start: usize, count: usize) -> String {
    match count {
        0 => format!("{start},0"),
        1 => format!("{}", start + 1),
        _ => format!("{},{count}", start + 1),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffEngine {
    context: usize,
}

impl Default for DiffEngine {
    fn default() -> Self {
        Self::new(DEFAULT_CONTEXT)
    }
}

impl DiffEngine {
    pub fn new(context: usize) -> Self {
        Self { context }
    }

    /// Unified diff of two texts. Identical inputs give no lines at all.
    pub fn diff_text(&self, old: &str, new: &str, old_label: &str, new_label: &str) -> Vec<String> {
        let old_lines: Vec<&str> = old.lines().collect();
        let new_lines: Vec<&str> = new.lines().collect();
        let script = edits(&old_lines, &new_lines);

        let changes: Vec<usize> = script
            .iter()
            .enumerate()
            .filter(|(_, e)| e.op != LineOp::Equal)
            .map(|(idx, _)| idx)
            .collect();
        let Some(&first) = changes.first() else {
            return Vec::new();
        };

        let mut out = vec![format!("--- {old_label}"), format!("+++ {new_label}")];
        let mut group = (first, first);
        for &idx in &changes[1..] {
            if idx - group.1 - 1 <= 2 * self.context {
                group.1 = idx;
            } else {
                self.push_hunk(&script, group, &mut out);
                group = (idx, idx);
            }
        }
        self.push_hunk(&script, group, &mut out);
        out
    }

    fn push_hunk(&self, script: &[Edit<'_>], (first, last): (usize, usize), out: &mut Vec<String>) {
        let start = first.saturating_sub(self.context);
        let end = (last + self.context + 1).min(script.len());
        let hunk = &script[start..end];

        let old_count = hunk.iter().filter(|e| e.op != LineOp::Insert).count();
        let new_count = hunk.iter().filter(|e| e.op != LineOp::Delete).count();
        out.push(format!(
            "@@ -{} +{} @@",
            hunk_range(hunk[0].old_pos, old_count),
            hunk_range(hunk[0].new_pos, new_count)
        ));
        out.extend(hunk.iter().map(|e| format!("{}{}", e.op.prefix(), e.text)));
    }

    /// Unified diff of two versions' snapshots, labelled `vN`.
    pub fn diff(
        &self,
        older: &DocumentVersion,
        newer: &DocumentVersion,
    ) -> Result<Vec<String>, DiffError> {
        let (old, new) = snapshots(older, newer)?;
        Ok(self.diff_text(old, new, &older.label(), &newer.label()))
    }

    pub fn summary(
        &self,
        older: &DocumentVersion,
        newer: &DocumentVersion,
    ) -> Result<DiffSummary, DiffError> {
        let (old, new) = snapshots(older, newer)?;
        Ok(summarize(old, new))
    }

    /// Look both versions up in `repo` and diff them.
    pub fn diff_versions(
        &self,
        repo: &dyn Repository,
        identity: &str,
        from: u32,
        to: u32,
    ) -> Result<(Vec<String>, DiffSummary), DiffError> {
        let older = find_version(repo, identity, from)?;
        let newer = find_version(repo, identity, to)?;
        Ok((self.diff(&older, &newer)?, self.summary(&older, &newer)?))
    }
}

pub fn summarize(old: &str, new: &str) -> DiffSummary {
    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();
    let mut summary = DiffSummary::default();
    for edit in edits(&old_lines, &new_lines) {
        match edit.op {
            LineOp::Equal => summary.unchanged += 1,
            LineOp::Delete => summary.deleted += 1,
            LineOp::Insert => summary.added += 1,
        }
    }
    summary
}

fn snapshots<'v>(
    older: &'v DocumentVersion,
    newer: &'v DocumentVersion,
) -> Result<(&'v str, &'v str), DiffError> {
    let body = |v: &'v DocumentVersion| {
        v.rendered_body
            .as_deref()
            .ok_or(DiffError::MissingSnapshot {
                version: v.version_number,
            })
    };
    Ok((body(older)?, body(newer)?))
}

fn find_version(
    repo: &dyn Repository,
    identity: &str,
    version: u32,
) -> Result<DocumentVersion, DiffError> {
    repo.version(identity, version)?
        .ok_or_else(|| DiffError::VersionNotFound {
            identity: identity.to_string(),
            version,
        })
}
