//! Key rotation: re-encrypt every stored backup under a new password
//!
//! Entries are processed one at a time. For each one the new archive is
//! uploaded under a fresh name and the ledger is repointed before the old
//! blob is deleted, so an interruption leaves every entry pointing at a
//! readable blob. The run is still not transactional: stopping part way
//! leaves some backups under the old password and some under the new one.

use serde_json::json;
use tracing::{info, info_span, warn};

use super::repository::BackupRepository;
use crate::archive::write_archive;
use crate::audit::{Operation, Status};
use crate::crypto::Password;
use crate::error::{BackupError, BackupResult};
use crate::file_io::sha256_file;
use crate::ledger::{BlobUpdate, LedgerEntry};

/// Per-run rotation results
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RotationReport {
    /// Short ids re-encrypted and repointed
    pub rotated: Vec<String>,
    /// Short id and error for entries left untouched
    pub failed: Vec<(String, String)>,
    /// Old blobs that could not be deleted after repointing
    pub orphaned: Vec<String>,
}

/// Re-encrypts the archives of a repository
pub struct KeyRotator<'a> {
    repo: &'a BackupRepository,
}

impl<'a> KeyRotator<'a> {
    pub fn new(repo: &'a BackupRepository) -> Self {
        Self { repo }
    }

    /// Rotate every entry from `old` to `new`; `profile` labels the audit record
    pub fn rotate(&self, old: &Password, new: &Password, profile: &str) -> BackupResult<RotationReport> {
        let _span = info_span!("rotate_key", repo = %self.repo.repo()).entered();

        if new.is_empty() {
            return Err(BackupError::Validation("New password must not be empty".into()));
        }

        let entries = match self.repo.ledger().list() {
            Ok(entries) => entries,
            Err(e) => {
                self.repo.audit(Operation::RotateKey, profile, Status::Failure, json!({ "error": e.to_string() }));
                return Err(e);
            }
        };
        if entries.is_empty() {
            return Err(BackupError::NotFound {
                entity_type: "Backup",
                identifier: format!("any backup in {}", self.repo.repo()),
            });
        }

        info!(count = entries.len(), "Re-encrypting backups");
        let mut report = RotationReport::default();

        for (index, entry) in entries.iter().enumerate() {
            info!(step = index + 1, total = entries.len(), backup = entry.short_id(), "Rotating");
            match self.rotate_entry(entry, old, new) {
                Ok(orphan) => {
                    report.rotated.push(entry.short_id().to_string());
                    if let Some(name) = orphan {
                        report.orphaned.push(name);
                    }
                }
                Err(e) => {
                    warn!(backup = entry.short_id(), error = %e, "Rotation failed, entry left unchanged");
                    report.failed.push((entry.short_id().to_string(), e.to_string()));
                }
            }
        }

        let status = match (report.rotated.is_empty(), report.failed.is_empty()) {
            (_, true) => Status::Success,
            (false, false) => Status::Partial,
            (true, false) => Status::Failure,
        };
        self.repo.audit(
            Operation::RotateKey,
            profile,
            status,
            json!({
                "re_encrypted": report.rotated.len(),
                "failed": report.failed.len(),
                "orphaned": report.orphaned,
            }),
        );
        Ok(report)
    }

    /// Returns the old blob name when it could not be deleted
    fn rotate_entry(&self, entry: &LedgerEntry, old: &Password, new: &Password) -> BackupResult<Option<String>> {
        let scratch = self.repo.scratch()?;
        let fetched = self.repo.fetch(entry, old, scratch.path())?;

        let staging = scratch.path().join("staging.tbk");
        let size = write_archive(&staging, fetched.payload.as_bytes(), new, self.repo.params())?;
        let sha256 = sha256_file(&staging)?;

        let filename = format!(
            "backup_{}_{}.tbk",
            entry.short_id(),
            &sha256[..8]
        );
        let upload_path = scratch.path().join(&filename);
        std::fs::rename(&staging, &upload_path)?;
        let commit_sha = self.repo.store().upload_blob(self.repo.repo(), &upload_path)?;

        let update = BlobUpdate {
            filename: filename.clone(),
            sha256,
            size,
            commit_sha,
            archive_version: 2,
        };
        let previous = self.repo.ledger().replace_blob(&entry.id, &update)?;

        if previous.filename == filename {
            return Ok(None);
        }
        match self.repo.store().delete_blob(self.repo.repo(), &previous.filename) {
            Ok(()) => Ok(None),
            Err(e) => {
                warn!(blob = %previous.filename, error = %e, "Could not delete old archive");
                Ok(Some(previous.filename))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{open_archive, write_sealed};
    use crate::audit::recording::RecordingAudit;
    use crate::config::ProfileConfig;
    use crate::crypto::{encrypt_v1, Argon2Params};
    use crate::remote::{LocalStore, RemoteStore};
    use crate::services::backup::{BackupOutcome, BackupService};
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    const REPO: &str = "alice/backups";

    fn setup() -> (TempDir, Arc<LocalStore>, Arc<RecordingAudit>, BackupRepository) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(LocalStore::new(dir.path().join("store")));
        let audit = Arc::new(RecordingAudit::default());
        let repo = BackupRepository::new(store.clone(), REPO, dir.path().join("tmp"))
            .with_argon2_params(Argon2Params::new(256, 1, 1))
            .with_audit(audit.clone());
        (dir, store, audit, repo)
    }

    fn backup(dir: &TempDir, repo: &BackupRepository, body: &str) -> LedgerEntry {
        let src = dir.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("file.txt"), body).unwrap();
        let profile = ProfileConfig::new("docs", src.to_string_lossy(), REPO);
        match BackupService::new(repo).run(&profile, &Password::new("old"), false).unwrap() {
            BackupOutcome::Uploaded(s) => s.entry,
            other => panic!("unexpected {:?}", other),
        }
    }

    fn blob(store: &LocalStore, name: &str) -> std::path::PathBuf {
        store.root().join(REPO).join("blobs").join(name)
    }

    #[test]
    fn test_rotation_repoints_and_deletes_old_blobs() {
        let (dir, store, audit, repo) = setup();
        let first = backup(&dir, &repo, "one");
        let second = backup(&dir, &repo, "two");

        let report = KeyRotator::new(&repo)
            .rotate(&Password::new("old"), &Password::new("new"), "docs")
            .unwrap();
        assert_eq!(report.rotated.len(), 2);
        assert!(report.failed.is_empty());
        assert!(report.orphaned.is_empty());

        for original in [&first, &second] {
            let now = repo.ledger().find(&original.id).unwrap();
            assert_ne!(now.filename, original.filename);
            assert!(now.filename.starts_with(&format!("backup_{}_", original.short_id())));
            assert_eq!(now.archive_version, 2);

            let path = blob(&store, &now.filename);
            assert_eq!(sha256_file(&path).unwrap(), now.sha256);
            assert!(open_archive(&path, &Password::new("new")).is_ok());
            assert!(open_archive(&path, &Password::new("old")).unwrap_err().is_authentication());
            assert!(!blob(&store, &original.filename).exists());
        }
        assert_eq!(audit.operations().last(), Some(&(Operation::RotateKey, Status::Success)));
    }

    #[test]
    fn test_legacy_archive_is_upgraded() {
        let (dir, store, _, repo) = setup();
        let entry = backup(&dir, &repo, "legacy");

        // Rewrite the stored blob as a format 1 archive with the same payload
        let path = blob(&store, &entry.filename);
        let payload = open_archive(&path, &Password::new("old")).unwrap();
        let sealed = encrypt_v1(b"old", &payload, 1000).unwrap();
        write_sealed(&path, &sealed).unwrap();
        let legacy_sha = sha256_file(&path).unwrap();
        repo.ledger()
            .update(|doc| {
                let e = &mut doc.backups[0];
                e.sha256 = legacy_sha.clone();
                e.archive_version = 1;
                Ok(())
            })
            .unwrap();

        let report = KeyRotator::new(&repo)
            .rotate(&Password::new("old"), &Password::new("new"), "docs")
            .unwrap();
        assert_eq!(report.rotated.len(), 1);

        let now = repo.ledger().find(&entry.id).unwrap();
        assert_eq!(now.archive_version, 2);
        let upgraded = open_archive(&blob(&store, &now.filename), &Password::new("new")).unwrap();
        assert_eq!(upgraded, payload);
    }

    #[test]
    fn test_wrong_old_password_leaves_entries_untouched() {
        let (dir, store, audit, repo) = setup();
        let entry = backup(&dir, &repo, "one");

        let report = KeyRotator::new(&repo)
            .rotate(&Password::new("wrong"), &Password::new("new"), "docs")
            .unwrap();
        assert!(report.rotated.is_empty());
        assert_eq!(report.failed.len(), 1);

        assert_eq!(repo.ledger().find(&entry.id).unwrap(), entry);
        assert_eq!(store.list_blobs(REPO).unwrap(), vec![entry.filename.clone()]);
        assert_eq!(audit.operations().last(), Some(&(Operation::RotateKey, Status::Failure)));
    }

    #[test]
    fn test_missing_blob_is_partial() {
        let (dir, store, audit, repo) = setup();
        let gone = backup(&dir, &repo, "one");
        backup(&dir, &repo, "two");
        store.delete_blob(REPO, &gone.filename).unwrap();

        let report = KeyRotator::new(&repo)
            .rotate(&Password::new("old"), &Password::new("new"), "docs")
            .unwrap();
        assert_eq!(report.rotated.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(audit.operations().last(), Some(&(Operation::RotateKey, Status::Partial)));
    }

    #[test]
    fn test_empty_ledger_is_not_found() {
        let (_dir, _, _, repo) = setup();
        assert!(KeyRotator::new(&repo)
            .rotate(&Password::new("old"), &Password::new("new"), "docs")
            .unwrap_err()
            .is_not_found());
    }
}
