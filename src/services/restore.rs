//! Restore a backup, following its incremental chain

use std::path::{Path, PathBuf};

use serde_json::json;
use tracing::{info, info_span, warn};

use super::repository::BackupRepository;
use crate::audit::{Operation, Status};
use crate::chain::ChainResolver;
use crate::crypto::Password;
use crate::error::BackupResult;
use crate::events::BackupEvent;
use crate::manifest::FileRecord;

/// How a restore should treat the destination
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreOptions {
    /// Only list what would be restored
    pub dry_run: bool,
    /// Replace files that existed before the restore started
    pub overwrite: bool,
}

/// Result of a restore
#[derive(Debug, Clone, PartialEq)]
pub struct RestoreReport {
    pub backup_id: String,
    pub destination: PathBuf,
    pub dry_run: bool,
    /// Files written, or for a dry run the files that would be, by path
    pub files: Vec<FileRecord>,
    pub skipped_existing: usize,
    pub skipped_unsafe: usize,
    /// Number of archives in the resolved chain
    pub chain_length: usize,
    /// Set when the chain stopped at a parent missing from the ledger
    pub missing_parent: Option<String>,
}

impl RestoreReport {
    pub fn is_partial(&self) -> bool {
        self.missing_parent.is_some()
    }
}

/// Service for restoring backups
pub struct RestoreService<'a> {
    repo: &'a BackupRepository,
}

impl<'a> RestoreService<'a> {
    pub fn new(repo: &'a BackupRepository) -> Self {
        Self { repo }
    }

    /// Restore `id_or_prefix` into `dest`; `profile` labels the audit record
    pub fn restore(
        &self,
        id_or_prefix: &str,
        password: &Password,
        dest: &Path,
        options: RestoreOptions,
        profile: &str,
    ) -> BackupResult<RestoreReport> {
        let _span = info_span!("restore", backup = %id_or_prefix, dest = %dest.display()).entered();

        let result = self.execute(id_or_prefix, password, dest, options);
        match &result {
            Ok(report) if !report.dry_run => {
                let status = if report.is_partial() {
                    Status::Partial
                } else {
                    Status::Success
                };
                self.repo.audit(
                    Operation::Restore,
                    profile,
                    status,
                    json!({
                        "backup_id": short(&report.backup_id),
                        "restored": report.files.len(),
                        "skipped": report.skipped_existing + report.skipped_unsafe,
                    }),
                );
                self.repo.publish(&BackupEvent::Restored {
                    backup_id: report.backup_id.clone(),
                    destination: report.destination.clone(),
                    files_restored: report.files.len(),
                });
            }
            Ok(_) => {}
            Err(e) => self.repo.audit(
                Operation::Restore,
                profile,
                Status::Failure,
                json!({ "backup_id": id_or_prefix, "error": e.to_string() }),
            ),
        }
        result
    }

    fn execute(
        &self,
        id_or_prefix: &str,
        password: &Password,
        dest: &Path,
        options: RestoreOptions,
    ) -> BackupResult<RestoreReport> {
        let chain = ChainResolver::new(self.repo, password).resolve(id_or_prefix)?;
        let backup_id = chain
            .target()
            .map(|link| link.entry.id.clone())
            .unwrap_or_else(|| id_or_prefix.to_string());
        if let Some(missing) = chain.missing_parent() {
            warn!(parent = %missing, "Restoring a partial chain");
        }

        let merged = chain.merged_files();

        if options.dry_run {
            info!(files = merged.len(), "Dry run, nothing written");
            return Ok(RestoreReport {
                backup_id,
                destination: dest.to_path_buf(),
                dry_run: true,
                files: merged.into_values().collect(),
                skipped_existing: 0,
                skipped_unsafe: 0,
                chain_length: chain.len(),
                missing_parent: chain.missing_parent().map(str::to_string),
            });
        }

        let stats = chain.materialize(dest, options.overwrite)?;
        let files = stats
            .written
            .iter()
            .filter_map(|path| merged.get(path).cloned())
            .collect();
        info!(
            restored = stats.written.len(),
            skipped_existing = stats.skipped_existing,
            skipped_unsafe = stats.skipped_unsafe,
            "Restore complete"
        );

        Ok(RestoreReport {
            backup_id,
            destination: dest.to_path_buf(),
            dry_run: false,
            files,
            skipped_existing: stats.skipped_existing,
            skipped_unsafe: stats.skipped_unsafe,
            chain_length: chain.len(),
            missing_parent: chain.missing_parent().map(str::to_string),
        })
    }
}

fn short(id: &str) -> &str {
    &id[..id.len().min(12)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::recording::RecordingAudit;
    use crate::config::ProfileConfig;
    use crate::crypto::Argon2Params;
    use crate::remote::LocalStore;
    use crate::services::backup::{BackupOutcome, BackupService};
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    const REPO: &str = "alice/backups";

    fn setup() -> (TempDir, Arc<RecordingAudit>, BackupRepository, ProfileConfig) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(LocalStore::new(dir.path().join("store")));
        let audit = Arc::new(RecordingAudit::default());
        let repo = BackupRepository::new(store, REPO, dir.path().join("tmp"))
            .with_argon2_params(Argon2Params::new(256, 1, 1))
            .with_audit(audit.clone());
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("sub")).unwrap();
        fs::write(src.join("a.txt"), "alpha").unwrap();
        fs::write(src.join("sub/b.txt"), "beta").unwrap();
        let profile = ProfileConfig::new("docs", src.to_string_lossy(), REPO);
        (dir, audit, repo, profile)
    }

    fn backup(repo: &BackupRepository, profile: &ProfileConfig) -> String {
        match BackupService::new(repo).run(profile, &Password::new("p"), false).unwrap() {
            BackupOutcome::Uploaded(s) => s.entry.id,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_restore_into_empty_directory() {
        let (dir, audit, repo, profile) = setup();
        let id = backup(&repo, &profile);
        let dest = dir.path().join("out");

        let report = RestoreService::new(&repo)
            .restore(&id[..8], &Password::new("p"), &dest, RestoreOptions::default(), "docs")
            .unwrap();

        assert_eq!(report.backup_id, id);
        assert_eq!(report.files.len(), 2);
        assert_eq!(report.chain_length, 1);
        assert!(!report.is_partial());
        assert_eq!(fs::read_to_string(dest.join("a.txt")).unwrap(), "alpha");
        assert_eq!(fs::read_to_string(dest.join("sub/b.txt")).unwrap(), "beta");
        assert!(!dest.join("manifest.json").exists());
        assert!(audit.operations().contains(&(Operation::Restore, Status::Success)));
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let (dir, _, repo, profile) = setup();
        let id = backup(&repo, &profile);
        let dest = dir.path().join("out");

        let options = RestoreOptions {
            dry_run: true,
            overwrite: false,
        };
        let report = RestoreService::new(&repo)
            .restore(&id, &Password::new("p"), &dest, options, "docs")
            .unwrap();

        let paths: Vec<&str> = report.files.iter().map(|f| f.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["a.txt", "sub/b.txt"]);
        assert!(!dest.exists());
    }

    #[test]
    fn test_existing_files_kept_without_overwrite() {
        let (dir, _, repo, profile) = setup();
        let id = backup(&repo, &profile);
        let dest = dir.path().join("out");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("a.txt"), "local edit").unwrap();

        let report = RestoreService::new(&repo)
            .restore(&id, &Password::new("p"), &dest, RestoreOptions::default(), "docs")
            .unwrap();
        assert_eq!(report.skipped_existing, 1);
        assert_eq!(fs::read_to_string(dest.join("a.txt")).unwrap(), "local edit");

        let overwrite = RestoreOptions {
            dry_run: false,
            overwrite: true,
        };
        RestoreService::new(&repo)
            .restore(&id, &Password::new("p"), &dest, overwrite, "docs")
            .unwrap();
        assert_eq!(fs::read_to_string(dest.join("a.txt")).unwrap(), "alpha");
    }

    #[test]
    fn test_wrong_password_fails_and_audits() {
        let (dir, audit, repo, profile) = setup();
        let id = backup(&repo, &profile);

        let err = RestoreService::new(&repo)
            .restore(&id, &Password::new("wrong"), &dir.path().join("out"), RestoreOptions::default(), "docs")
            .unwrap_err();
        assert!(err.is_authentication());
        assert!(audit.operations().contains(&(Operation::Restore, Status::Failure)));
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let (dir, _, repo, profile) = setup();
        backup(&repo, &profile);
        let err = RestoreService::new(&repo)
            .restore("ffffffff", &Password::new("p"), &dir.path().join("out"), RestoreOptions::default(), "docs")
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
