//! Error and warning types shared across the engine.
//!
//! Warnings are recoverable and travel with the [`DocumentModel`](crate::DocumentModel);
//! errors abort the unit of work they belong to (one document, one diff
//! request, one reconcile attempt) and nothing larger.

use serde::Serialize;
use thiserror::Error;

/// A recoverable problem found while extracting a document.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractionWarning {
    #[error("frontmatter block opened on line 1 is never closed")]
    UnterminatedFrontmatter,

    #[error("unparsable frontmatter near line {line}: {message}")]
    MalformedFrontmatter { line: usize, message: String },

    #[error("unsupported markdown element dropped: {element}")]
    UnsupportedToken { element: String },
}

/// The token stream could not be folded into blocks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblyError {
    #[error("container `{container}` is never closed")]
    UnterminatedContainer { container: String },

    #[error("closing `{found}` does not match the open `{expected}`")]
    MismatchedClose { expected: String, found: String },

    #[error("closing `{found}` without a matching opener")]
    UnexpectedClose { found: String },
}

/// Failure to turn a source file into a [`DocumentModel`](crate::DocumentModel).
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Assembly(#[from] AssemblyError),

    #[error(transparent)]
    Io(#[from] crate::io::IoError),
}

/// Failures reported by a [`Repository`](crate::Repository) backend.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("version {attempted} of `{identity}` conflicts with stored version {latest}")]
    Conflict {
        identity: String,
        attempted: u32,
        latest: u32,
    },

    #[error("timed out after {waited_ms}ms waiting for `{identity}`")]
    Timeout { identity: String, waited_ms: u128 },

    #[error("storage IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt history record: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Failure of a single reconcile attempt.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("concurrent write for `{identity}`; re-fetch and retry")]
    Conflict { identity: String },

    #[error("repository timed out for `{identity}`")]
    Timeout { identity: String },

    #[error("version {version} of `{identity}` does not exist")]
    VersionNotFound { identity: String, version: u32 },

    #[error("repository failure: {0}")]
    Storage(RepositoryError),
}

impl ReconcileError {
    /// Whether running the same reconcile again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Timeout { .. })
    }
}

impl From<RepositoryError> for ReconcileError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict { identity, .. } => Self::Conflict { identity },
            RepositoryError::Timeout { identity, .. } => Self::Timeout { identity },
            other => Self::Storage(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum DiffError {
    #[error("version {version} has no rendered snapshot")]
    MissingSnapshot { version: u32 },

    #[error("version {version} of `{identity}` does not exist")]
    VersionNotFound { identity: String, version: u32 },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML serialization failed: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Diff(#[from] DiffError),

    #[error(transparent)]
    Io(#[from] crate::io::IoError),
}
