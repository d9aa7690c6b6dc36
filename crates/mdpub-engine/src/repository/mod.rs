//! Durable version history, behind the [`Repository`] capability trait.
//!
//! Every implementation must make `create` an identity-scoped
//! compare-and-append: a version is only accepted when its number is exactly
//! one past the stored latest. Concurrent reconciles of the same document
//! therefore cannot produce duplicate or skipped version numbers; the loser
//! gets [`RepositoryError::Conflict`] and retries from a fresh read.

mod file;
mod memory;

pub use file::FileRepository;
pub use memory::MemoryRepository;

use crate::error::RepositoryError;
use crate::models::DocumentVersion;

pub trait Repository: Send + Sync {
    /// Most recent version for `identity`, if any.
    fn latest_version(&self, identity: &str) -> Result<Option<DocumentVersion>, RepositoryError>;

    /// Append `version` for `identity`.
    fn create(&self, identity: &str, version: DocumentVersion) -> Result<(), RepositoryError>;

    /// All versions for `identity`, oldest first.
    fn history(&self, identity: &str) -> Result<Vec<DocumentVersion>, RepositoryError>;

    /// Known identities, sorted.
    fn identities(&self) -> Result<Vec<String>, RepositoryError>;

    /// A single version by number.
    fn version(
        &self,
        identity: &str,
        version_number: u32,
    ) -> Result<Option<DocumentVersion>, RepositoryError> {
        Ok(self
            .history(identity)?
            .into_iter()
            .find(|v| v.version_number == version_number))
    }
}

/// Check that `version` may follow `latest`.
pub(crate) fn check_append(
    identity: &str,
    latest: Option<&DocumentVersion>,
    version: &DocumentVersion,
) -> Result<(), RepositoryError> {
    let expected = latest.map_or(1, |v| v.version_number + 1);
    let id_matches = latest.is_none_or(|v| v.document_id == version.document_id);
    if version.version_number != expected || !id_matches {
        return Err(RepositoryError::Conflict {
            identity: identity.to_string(),
            attempted: version.version_number,
            latest: latest.map_or(0, |v| v.version_number),
        });
    }
    Ok(())
}

/// Behaviour every backend must share; run against each implementation.
#[cfg(test)]
pub(crate) mod contract {
    use super::*;

    pub fn append_and_read_back(repo: &dyn Repository) {
        assert!(repo.latest_version("a.md").unwrap().is_none());
        assert!(repo.history("a.md").unwrap().is_empty());

        let v1 = DocumentVersion::first("h1", "body 1");
        repo.create("a.md", v1.clone()).unwrap();
        let v2 = v1.next("h2", "body 2");
        repo.create("a.md", v2.clone()).unwrap();

        assert_eq!(repo.latest_version("a.md").unwrap(), Some(v2.clone()));
        assert_eq!(repo.history("a.md").unwrap(), vec![v1.clone(), v2]);
        assert_eq!(repo.version("a.md", 1).unwrap(), Some(v1));
        assert_eq!(repo.version("a.md", 9).unwrap(), None);
    }

    pub fn rejects_gaps_and_duplicates(repo: &dyn Repository) {
        let v1 = DocumentVersion::first("h1", "body");
        repo.create("a.md", v1.clone()).unwrap();

        let duplicate = repo.create("a.md", DocumentVersion::first("h2", "other"));
        assert!(matches!(
            duplicate,
            Err(RepositoryError::Conflict {
                attempted: 1,
                latest: 1,
                ..
            })
        ));

        let mut gap = v1.next("h3", "skip");
        gap.version_number = 3;
        assert!(matches!(
            repo.create("a.md", gap),
            Err(RepositoryError::Conflict { .. })
        ));
        assert_eq!(repo.history("a.md").unwrap().len(), 1);
    }

    pub fn lists_identities_sorted(repo: &dyn Repository) {
        repo.create("z/last.md", DocumentVersion::first("h", "b")).unwrap();
        repo.create("a/first.md", DocumentVersion::first("h", "b")).unwrap();

        assert_eq!(repo.identities().unwrap(), vec!["a/first.md", "z/last.md"]);
    }
}
