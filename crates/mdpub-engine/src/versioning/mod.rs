//! Change detection against stored history.

pub mod diff;

use std::thread;
use std::time::Duration;

pub use diff::{DEFAULT_CONTEXT, DiffEngine, DiffSummary};

use crate::error::ReconcileError;
use crate::export::Exporter;
use crate::models::{DocumentModel, DocumentVersion, Outcome};
use crate::repository::Repository;

/// Decides whether an extracted document is new, unchanged or updated, and
/// records new versions.
#[derive(Debug, Clone, Copy, Default)]
pub struct VersionTracker {
    exporter: Exporter,
}

impl VersionTracker {
    /// `exporter` renders the body snapshot stored on each version.
    pub fn new(exporter: Exporter) -> Self {
        Self { exporter }
    }

    /// Compare `model` with the latest stored version and append a new one
    /// when the hash differs.
    ///
    /// The append is a compare-and-append, so a concurrent writer for the
    /// same identity surfaces as a retryable [`ReconcileError::Conflict`]
    /// instead of a duplicate version.
    pub fn reconcile(
        &self,
        model: &DocumentModel,
        repo: &dyn Repository,
    ) -> Result<Outcome, ReconcileError> {
        let identity = model.identity();
        let latest = repo.latest_version(identity)?;

        let outcome = match latest {
            None => {
                let first = DocumentVersion::first(model.hash(), self.exporter.render_body(model));
                let document_id = first.document_id;
                repo.create(identity, first)?;
                log::info!("{identity}: created v1 ({document_id})");
                Outcome::Created
            }
            Some(latest) if latest.hash == model.hash() => Outcome::Unchanged,
            Some(latest) => {
                let next = latest.next(model.hash(), self.exporter.render_body(model));
                let number = next.version_number;
                repo.create(identity, next)?;
                log::info!("{identity}: updated to v{number}");
                Outcome::Updated(number)
            }
        };
        log::debug!("reconciled {identity}: {outcome}");
        Ok(outcome)
    }

    /// [`reconcile`](Self::reconcile), re-running retryable failures up to
    /// `retries` more times.
    pub fn reconcile_with_retry(
        &self,
        model: &DocumentModel,
        repo: &dyn Repository,
        retries: u32,
    ) -> Result<Outcome, ReconcileError> {
        retry(model.identity(), retries, || self.reconcile(model, repo))
    }

    /// Promote the snapshot of `version_number` to a new latest version.
    ///
    /// Reverting to content equal to the latest is a no-op.
    pub fn revert(
        &self,
        identity: &str,
        version_number: u32,
        repo: &dyn Repository,
    ) -> Result<Outcome, ReconcileError> {
        let target = repo
            .version(identity, version_number)?
            .ok_or_else(|| ReconcileError::VersionNotFound {
                identity: identity.to_string(),
                version: version_number,
            })?;
        let latest = repo
            .latest_version(identity)?
            .ok_or_else(|| ReconcileError::VersionNotFound {
                identity: identity.to_string(),
                version: version_number,
            })?;

        if latest.hash == target.hash {
            log::debug!("{identity}: v{version_number} is already current");
            return Ok(Outcome::Unchanged);
        }

        let mut next = latest.next(target.hash, String::new());
        next.rendered_body = target.rendered_body;
        let number = next.version_number;
        repo.create(identity, next)?;
        log::info!("{identity}: reverted to v{version_number} as v{number}");
        Ok(Outcome::Updated(number))
    }
}

fn retry<T>(
    identity: &str,
    retries: u32,
    mut attempt: impl FnMut() -> Result<T, ReconcileError>,
) -> Result<T, ReconcileError> {
    let mut tries = 0;
    loop {
        match attempt() {
            Err(err) if err.is_retryable() && tries < retries => {
                tries += 1;
                log::warn!("{identity}: {err} (retry {tries}/{retries})");
                thread::sleep(Duration::from_millis(5 * u64::from(tries)));
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RepositoryError;
    use crate::extract::{ExtractOptions, extract};
    use crate::repository::MemoryRepository;
    use relative_path::RelativePath;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn model(raw: &str) -> DocumentModel {
        extract(RelativePath::new("doc.md"), raw, ExtractOptions::default()).unwrap()
    }

    #[test]
    fn test_first_reconcile_creates_v1() {
        let repo = MemoryRepository::new();
        let tracker = VersionTracker::default();

        let outcome = tracker.reconcile(&model("# Hello\n"), &repo).unwrap();

        assert_eq!(outcome, Outcome::Created);
        let history = repo.history("doc.md").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].rendered_body.as_deref(), Some("# Hello\n"));
    }

    #[test]
    fn test_unchanged_document_is_idempotent() {
        let repo = MemoryRepository::new();
        let tracker = VersionTracker::default();
        tracker.reconcile(&model("# Hello\n"), &repo).unwrap();

        let outcome = tracker.reconcile(&model("# Hello   \n\n"), &repo).unwrap();

        assert_eq!(outcome, Outcome::Unchanged);
        assert_eq!(repo.history("doc.md").unwrap().len(), 1);
    }

    #[test]
    fn test_change_appends_next_version() {
        let repo = MemoryRepository::new();
        let tracker = VersionTracker::default();
        tracker.reconcile(&model("# One\n"), &repo).unwrap();

        let outcome = tracker.reconcile(&model("# Two\n"), &repo).unwrap();

        assert_eq!(outcome, Outcome::Updated(2));
        let history = repo.history("doc.md").unwrap();
        assert_eq!(history[1].document_id, history[0].document_id);
        assert_ne!(history[1].hash, history[0].hash);
    }

    #[test]
    fn test_edit_and_revert_source_returns_to_unchanged() {
        let repo = MemoryRepository::new();
        let tracker = VersionTracker::default();
        let original = model("# Title\n\nBody\n");

        tracker.reconcile(&original, &repo).unwrap();
        tracker.reconcile(&model("# Title\n\nEdited\n"), &repo).unwrap();
        let back = tracker.reconcile(&original, &repo).unwrap();

        assert_eq!(back, Outcome::Updated(3));
        let history = repo.history("doc.md").unwrap();
        assert_eq!(history[0].hash, history[2].hash);
        assert_eq!(tracker.reconcile(&original, &repo).unwrap(), Outcome::Unchanged);
    }

    #[test]
    fn test_revert_promotes_old_snapshot() {
        let repo = MemoryRepository::new();
        let tracker = VersionTracker::default();
        tracker.reconcile(&model("# One\n"), &repo).unwrap();
        tracker.reconcile(&model("# Two\n"), &repo).unwrap();

        let outcome = tracker.revert("doc.md", 1, &repo).unwrap();

        assert_eq!(outcome, Outcome::Updated(3));
        let history = repo.history("doc.md").unwrap();
        assert_eq!(history[2].hash, history[0].hash);
        assert_eq!(history[2].rendered_body, history[0].rendered_body);
        assert_eq!(tracker.revert("doc.md", 3, &repo).unwrap(), Outcome::Unchanged);
        assert_eq!(tracker.reconcile(&model("# One\n"), &repo).unwrap(), Outcome::Unchanged);
    }

    #[test]
    fn test_revert_to_unknown_version() {
        let repo = MemoryRepository::new();
        let err = VersionTracker::default().revert("doc.md", 4, &repo).unwrap_err();
        assert!(matches!(err, ReconcileError::VersionNotFound { version: 4, .. }));
    }

    /// Fails the first `failures` appends with a conflict.
    struct Flaky {
        inner: MemoryRepository,
        failures: AtomicU32,
    }

    impl Repository for Flaky {
        fn latest_version(&self, identity: &str) -> Result<Option<DocumentVersion>, RepositoryError> {
            self.inner.latest_version(identity)
        }

        fn create(&self, identity: &str, version: DocumentVersion) -> Result<(), RepositoryError> {
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(RepositoryError::Conflict {
                    identity: identity.to_string(),
                    attempted: version.version_number,
                    latest: version.version_number,
                });
            }
            self.inner.create(identity, version)
        }

        fn history(&self, identity: &str) -> Result<Vec<DocumentVersion>, RepositoryError> {
            self.inner.history(identity)
        }

        fn identities(&self) -> Result<Vec<String>, RepositoryError> {
            self.inner.identities()
        }
    }

    #[test]
    fn test_conflicts_are_retried() {
        let repo = Flaky {
            inner: MemoryRepository::new(),
            failures: AtomicU32::new(2),
        };

        let outcome = VersionTracker::default()
            .reconcile_with_retry(&model("# A\n"), &repo, 3)
            .unwrap();

        assert_eq!(outcome, Outcome::Created);
    }

    #[test]
    fn test_retries_are_bounded() {
        let repo = Flaky {
            inner: MemoryRepository::new(),
            failures: AtomicU32::new(5),
        };

        let err = VersionTracker::default()
            .reconcile_with_retry(&model("# A\n"), &repo, 1)
            .unwrap_err();

        assert!(err.is_retryable());
        assert!(repo.history("doc.md").unwrap().is_empty());
    }
}
