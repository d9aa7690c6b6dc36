use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{Repository, check_append};
use crate::error::RepositoryError;
use crate::models::DocumentVersion;

/// In-process history store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    histories: Mutex<BTreeMap<String, Vec<DocumentVersion>>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Vec<DocumentVersion>>> {
        // A panic mid-append cannot leave a half-written entry behind.
        self.histories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Repository for MemoryRepository {
    fn latest_version(&self, identity: &str) -> Result<Option<DocumentVersion>, RepositoryError> {
        Ok(self
            .lock()
            .get(identity)
            .and_then(|history| history.last().cloned()))
    }

    fn create(&self, identity: &str, version: DocumentVersion) -> Result<(), RepositoryError> {
        let mut histories = self.lock();
        let history = histories.entry(identity.to_string()).or_default();
        check_append(identity, history.last(), &version)?;
        history.push(version);
        Ok(())
    }

    fn history(&self, identity: &str) -> Result<Vec<DocumentVersion>, RepositoryError> {
        Ok(self.lock().get(identity).cloned().unwrap_or_default())
    }

    fn identities(&self) -> Result<Vec<String>, RepositoryError> {
        Ok(self
            .lock()
            .iter()
            .filter(|(_, history)| !history.is_empty())
            .map(|(identity, _)| identity.clone())
            .collect())
    }
}
