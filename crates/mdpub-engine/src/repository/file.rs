use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use relative_path::{Component, RelativePath, RelativePathBuf};

use super::{Repository, check_append};
use crate::error::RepositoryError;
use crate::models::DocumentVersion;

const HISTORY_EXT: &str = "json";
const LOCK_EXT: &str = "lock";
const LOCK_POLL: Duration = Duration::from_millis(10);

/// History store with one JSON file per identity under a root directory.
///
/// The layout mirrors identities: `docs/intro.md` lives in
/// `<root>/docs/intro.md.json`. Appends take an exclusive `.lock` file next
/// to the history, so several processes can share one store.
#[derive(Debug, Clone)]
pub struct FileRepository {
    root: PathBuf,
    timeout: Duration,
}

impl FileRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            timeout: Duration::from_secs(5),
        }
    }

    /// How long `create` waits for another writer before giving up.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn history_path(&self, identity: &str) -> Result<PathBuf, RepositoryError> {
        let relative = RelativePath::new(identity);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if identity.is_empty() || !safe {
            return Err(RepositoryError::Io(io::Error::new(
                ErrorKind::InvalidInput,
                format!("identity `{identity}` is not a plain relative path"),
            )));
        }
        Ok(with_suffix(&relative.to_path(&self.root), HISTORY_EXT))
    }

    fn read_history(&self, path: &Path) -> Result<Vec<DocumentVersion>, RepositoryError> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }

    fn lock(&self, identity: &str, history: &Path) -> Result<LockGuard, RepositoryError> {
        let path = with_suffix(history, LOCK_EXT);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let started = Instant::now();
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(LockGuard { path }),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    if started.elapsed() >= self.timeout {
                        return Err(RepositoryError::Timeout {
                            identity: identity.to_string(),
                            waited_ms: started.elapsed().as_millis(),
                        });
                    }
                    thread::sleep(LOCK_POLL);
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

impl Repository for FileRepository {
    fn latest_version(&self, identity: &str) -> Result<Option<DocumentVersion>, RepositoryError> {
        let path = self.history_path(identity)?;
        Ok(self.read_history(&path)?.pop())
    }

    fn create(&self, identity: &str, version: DocumentVersion) -> Result<(), RepositoryError> {
        let path = self.history_path(identity)?;
        let _lock = self.lock(identity, &path)?;

        let mut history = self.read_history(&path)?;
        check_append(identity, history.last(), &version)?;
        history.push(version);

        // Readers never take the lock, so replace the file atomically.
        let staging = with_suffix(&path, "tmp");
        fs::write(&staging, serde_json::to_string_pretty(&history)?)?;
        fs::rename(&staging, &path)?;
        Ok(())
    }

    fn history(&self, identity: &str) -> Result<Vec<DocumentVersion>, RepositoryError> {
        let path = self.history_path(identity)?;
        self.read_history(&path)
    }

    fn identities(&self) -> Result<Vec<String>, RepositoryError> {
        let mut identities = Vec::new();
        if self.root.is_dir() {
            collect_identities(&self.root, &self.root, &mut identities)?;
        }
        identities.sort();
        Ok(identities)
    }
}

fn collect_identities(
    root: &Path,
    dir: &Path,
    identities: &mut Vec<String>,
) -> Result<(), RepositoryError> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_identities(root, &path, identities)?;
            continue;
        }
        if path.extension().is_some_and(|ext| ext == HISTORY_EXT)
            && let Ok(relative) = path.with_extension("").strip_prefix(root)
            && let Ok(identity) = RelativePathBuf::from_path(relative)
        {
            identities.push(identity.into_string());
        }
    }
    Ok(())
}

/// `a/b.md` + `json` -> `a/b.md.json`
fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            log::warn!("failed to release lock {}: {err}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::contract;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn repo() -> (TempDir, FileRepository) {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileRepository::new(dir.path().join("store"));
        (dir, repo)
    }

    #[test]
    fn append_and_read_back() {
        let (_dir, repo) = repo();
        contract::append_and_read_back(&repo);
    }

    #[test]
    fn rejects_gaps_and_duplicates() {
        let (_dir, repo) = repo();
        contract::rejects_gaps_and_duplicates(&repo);
    }

    #[test]
    fn lists_identities_sorted() {
        let (_dir, repo) = repo();
        contract::lists_identities_sorted(&repo);
    }

    #[test]
    fn history_survives_reopening() {
        let (dir, repo) = repo();
        repo.create("docs/a.md", DocumentVersion::first("h", "b")).unwrap();

        let reopened = FileRepository::new(dir.path().join("store"));
        assert_eq!(reopened.history("docs/a.md").unwrap().len(), 1);
        assert!(dir.path().join("store/docs/a.md.json").is_file());
        assert!(!dir.path().join("store/docs/a.md.json.lock").exists());
    }

    #[test]
    fn held_lock_times_out() {
        let (dir, repo) = repo();
        let repo = repo.with_timeout(Duration::from_millis(30));
        fs::create_dir_all(dir.path().join("store")).unwrap();
        fs::write(dir.path().join("store/a.md.json.lock"), "").unwrap();

        let err = repo
            .create("a.md", DocumentVersion::first("h", "b"))
            .unwrap_err();

        assert!(matches!(err, RepositoryError::Timeout { .. }));
        assert!(repo.history("a.md").unwrap().is_empty());
    }

    #[test]
    fn escaping_identities_are_rejected() {
        let (_dir, repo) = repo();
        assert!(repo.history("../outside.md").is_err());
        assert!(repo.history("").is_err());
    }

    #[test]
    fn concurrent_appends_never_duplicate_numbers() {
        let (_dir, repo) = repo();
        let repo = Arc::new(repo);
        let first = DocumentVersion::first("h0", "b0");
        repo.create("a.md", first.clone()).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let repo = Arc::clone(&repo);
                let first = first.clone();
                thread::spawn(move || repo.create("a.md", first.next(format!("h{i}"), "b")))
            })
            .collect();
        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(Result::is_ok)
            .count();

        assert_eq!(successes, 1);
        let history = repo.history("a.md").unwrap();
        let numbers: Vec<u32> = history.iter().map(|v| v.version_number).collect();
        assert_eq!(numbers, vec![1, 2]);
    }
}
