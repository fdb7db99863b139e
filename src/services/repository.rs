//! Shared handle on one remote repository
//!
//! Bundles the remote store, the repository name, the local scratch
//! directory and the collaborators every service reports to.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use tracing::debug;

use crate::archive::{read_and_decrypt, read_header, ArchiveHeader, Payload};
use crate::audit::{AuditSink, NullAudit, Operation, Status};
use crate::crypto::{Argon2Params, Password};
use crate::error::{BackupError, BackupResult};
use crate::events::{BackupEvent, EventBus};
use crate::ledger::{Ledger, LedgerEntry};
use crate::remote::RemoteStore;

/// A downloaded and decrypted archive
pub struct FetchedArchive {
    /// Local copy of the blob, inside the caller's scratch directory
    pub path: PathBuf,
    pub header: ArchiveHeader,
    pub payload: Payload,
}

/// One repository in a remote store plus local working state
pub struct BackupRepository {
    store: Arc<dyn RemoteStore>,
    repo: String,
    scratch_root: PathBuf,
    conflict_retries: u32,
    params: Argon2Params,
    audit: Arc<dyn AuditSink>,
    events: Arc<EventBus>,
}

impl BackupRepository {
    pub fn new(store: Arc<dyn RemoteStore>, repo: impl Into<String>, scratch_root: impl Into<PathBuf>) -> Self {
        Self {
            store,
            repo: repo.into(),
            scratch_root: scratch_root.into(),
            conflict_retries: 0,
            params: Argon2Params::default(),
            audit: Arc::new(NullAudit),
            events: Arc::new(EventBus::new()),
        }
    }

    pub fn with_conflict_retries(mut self, retries: u32) -> Self {
        self.conflict_retries = retries;
        self
    }

    /// Argon2id cost used for archives written through this handle
    pub fn with_argon2_params(mut self, params: Argon2Params) -> Self {
        self.params = params;
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn store(&self) -> &dyn RemoteStore {
        self.store.as_ref()
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    pub fn params(&self) -> &Argon2Params {
        &self.params
    }

    pub fn ledger(&self) -> Ledger<'_> {
        Ledger::new(self.store.as_ref(), self.repo.clone()).with_conflict_retries(self.conflict_retries)
    }

    /// Fresh scratch directory, removed when the guard drops
    pub fn scratch(&self) -> BackupResult<TempDir> {
        std::fs::create_dir_all(&self.scratch_root).map_err(|e| {
            BackupError::Io(format!(
                "Failed to create scratch directory {}: {}",
                self.scratch_root.display(),
                e
            ))
        })?;
        tempfile::Builder::new()
            .prefix("termbackup-")
            .tempdir_in(&self.scratch_root)
            .map_err(|e| BackupError::Io(format!("Failed to create scratch directory: {}", e)))
    }

    /// Download an entry's blob into `dir`
    pub fn download(&self, entry: &LedgerEntry, dir: &Path) -> BackupResult<PathBuf> {
        let path = dir.join(&entry.filename);
        self.store.download_blob(&self.repo, &entry.filename, &path)?;
        debug!(backup = entry.short_id(), file = %entry.filename, "Blob downloaded");
        Ok(path)
    }

    /// Download an entry's blob into `dir` and decrypt it
    pub fn fetch(&self, entry: &LedgerEntry, password: &Password, dir: &Path) -> BackupResult<FetchedArchive> {
        let path = self.download(entry, dir)?;
        let header = read_header(&path)?;
        let compressed = read_and_decrypt(&path, password, &header).map_err(|e| match e {
            BackupError::Authentication(_) => BackupError::Authentication(format!(
                "Wrong password or corrupted archive for backup {}",
                entry.short_id()
            )),
            other => other,
        })?;
        Ok(FetchedArchive {
            path,
            header,
            payload: Payload::new(compressed),
        })
    }

    pub fn audit(&self, operation: Operation, profile: &str, status: Status, details: serde_json::Value) {
        self.audit.record(operation, profile, status, details);
    }

    pub fn publish(&self, event: &BackupEvent) {
        self.events.publish(event);
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::LocalStore;

    #[test]
    fn test_scratch_is_removed_on_drop() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(LocalStore::new(dir.path().join("store")));
        let repo = BackupRepository::new(store, "alice/backups", dir.path().join("tmp"));

        let scratch = repo.scratch().unwrap();
        let path = scratch.path().to_path_buf();
        assert!(path.starts_with(dir.path().join("tmp")));
        std::fs::write(path.join("x.tbk"), b"x").unwrap();

        drop(scratch);
        assert!(!path.exists());
    }

    #[test]
    fn test_download_missing_blob_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(LocalStore::new(dir.path().join("store")));
        let repo = BackupRepository::new(store, "alice/backups", dir.path().join("tmp"));
        let entry = crate::ledger::model::fixtures::entry("abc", "2024-01-01T00:00:00+00:00");

        let scratch = repo.scratch().unwrap();
        assert!(repo.download(&entry, scratch.path()).unwrap_err().is_not_found());
    }
}
