//! Backup runs
//!
//! A run is strictly sequential: scan and seal the manifest, build and
//! encrypt the archive, upload it, then append the ledger entry. Any failure
//! aborts the remaining steps. The local archive lives in a scratch
//! directory that is removed on every exit path.

use std::collections::HashSet;
use std::path::Path;

use serde_json::json;
use tracing::{info, info_span, warn};

use super::prune::{PruneReport, PruneService};
use super::repository::BackupRepository;
use crate::archive::{archive_filename, build_payload, write_archive};
use crate::audit::{Operation, Status};
use crate::chain::ChainResolver;
use crate::config::ProfileConfig;
use crate::crypto::Password;
use crate::diff::diff_files;
use crate::error::{BackupError, BackupResult};
use crate::events::BackupEvent;
use crate::file_io::sha256_file;
use crate::ledger::LedgerEntry;
use crate::manifest::{BackupMode, FileRecord, Manifest, ManifestBuilder};
use crate::signing::ArchiveSigner;

/// What a completed upload produced
#[derive(Debug, Clone)]
pub struct BackupSummary {
    pub entry: LedgerEntry,
    /// Uncompressed size of the archived files
    pub total_size: u64,
    pub parent_backup_id: Option<String>,
    pub added: usize,
    pub modified: usize,
    pub deleted: usize,
    /// Retention run after the upload, when the profile has a policy
    pub pruned: Option<PruneReport>,
}

/// Result of [`BackupService::run`]
#[derive(Debug, Clone)]
pub enum BackupOutcome {
    Uploaded(BackupSummary),
    /// Archive built and encrypted, nothing uploaded
    DryRun {
        backup_id: String,
        file_count: usize,
        total_size: u64,
        archive_size: u64,
    },
    /// Incremental run with nothing added or modified since the parent
    Unchanged { parent_backup_id: String },
}

/// Service for creating backups
pub struct BackupService<'a> {
    repo: &'a BackupRepository,
    signer: Option<&'a dyn ArchiveSigner>,
    workers: usize,
}

struct Delta {
    parent: Option<String>,
    added: usize,
    modified: usize,
    deleted: usize,
}

impl<'a> BackupService<'a> {
    pub fn new(repo: &'a BackupRepository) -> Self {
        Self {
            repo,
            signer: None,
            workers: 0,
        }
    }

    /// Sign uploaded archives; the backup password unlocks the key
    pub fn with_signer(mut self, signer: &'a dyn ArchiveSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Hashing pool size (0 = default)
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Back up `profile.source_dir` into the repository
    pub fn run(&self, profile: &ProfileConfig, password: &Password, dry_run: bool) -> BackupResult<BackupOutcome> {
        let _span = info_span!("backup", profile = %profile.name, mode = %profile.backup_mode).entered();

        profile.validate()?;
        if password.is_empty() {
            return Err(BackupError::Validation("Backup password must not be empty".into()));
        }

        self.repo.publish(&BackupEvent::PreBackup {
            profile: profile.name.clone(),
            source_dir: profile.source_path(),
        });

        let result = self.execute(profile, password, dry_run);

        match &result {
            Ok(BackupOutcome::Uploaded(summary)) => {
                self.repo.audit(
                    Operation::Backup,
                    &profile.name,
                    Status::Success,
                    json!({
                        "backup_id": summary.entry.short_id(),
                        "file_count": summary.entry.file_count,
                        "archive_size": summary.entry.size,
                    }),
                );
                self.repo.publish(&BackupEvent::PostBackup {
                    profile: profile.name.clone(),
                    backup_id: summary.entry.id.clone(),
                    file_count: summary.entry.file_count,
                    size: summary.entry.size,
                });
            }
            Ok(BackupOutcome::Unchanged { parent_backup_id }) => {
                self.repo.audit(
                    Operation::Backup,
                    &profile.name,
                    Status::Skipped,
                    json!({ "reason": "unchanged", "parent": parent_backup_id }),
                );
            }
            Ok(BackupOutcome::DryRun { .. }) => {}
            Err(e) => {
                self.repo.audit(
                    Operation::Backup,
                    &profile.name,
                    Status::Failure,
                    json!({ "error": e.to_string() }),
                );
                self.repo.publish(&BackupEvent::BackupFailed {
                    profile: profile.name.clone(),
                    error: e.to_string(),
                });
            }
        }

        let mut outcome = result?;

        if let BackupOutcome::Uploaded(summary) = &mut outcome {
            let policy = profile.retention();
            if policy.is_enabled() {
                match PruneService::new(self.repo).enforce(&policy, &profile.name) {
                    Ok(report) => summary.pruned = Some(report),
                    Err(e) => warn!(error = %e, "Retention pass failed after backup"),
                }
            }
        }

        Ok(outcome)
    }

    fn execute(&self, profile: &ProfileConfig, password: &Password, dry_run: bool) -> BackupResult<BackupOutcome> {
        let source = profile.source_path();
        let builder = ManifestBuilder::new(&profile.excludes).with_workers(self.workers);
        let scanned = builder.build(&source, profile.backup_mode, None)?;

        let (manifest, delta) = match profile.backup_mode {
            BackupMode::Full => (scanned, Delta::full()),
            BackupMode::Incremental => match self.incremental_base(password)? {
                None => (scanned, Delta::full()),
                Some((parent_id, base)) => {
                    let changes = diff_files(&scanned.files, &base);
                    let keep: HashSet<String> = changes.changed_paths().map(str::to_string).collect();
                    info!(
                        added = changes.added.len(),
                        modified = changes.modified.len(),
                        deleted = changes.deleted.len(),
                        "Incremental changes"
                    );
                    if keep.is_empty() {
                        info!(parent = %parent_id, "No changes detected, skipping backup");
                        return Ok(BackupOutcome::Unchanged {
                            parent_backup_id: parent_id,
                        });
                    }

                    let mut narrowed = scanned;
                    narrowed.parent_backup_id = Some(parent_id.clone());
                    let narrowed = narrowed.narrow(|f| keep.contains(&f.relative_path))?;
                    let delta = Delta {
                        parent: Some(parent_id),
                        added: changes.added.len(),
                        modified: changes.modified.len(),
                        deleted: changes.deleted.len(),
                    };
                    (narrowed, delta)
                }
            },
        };

        self.archive_and_upload(profile, &source, manifest, password, dry_run, delta)
    }

    /// Latest backup and the merged file view of its chain
    fn incremental_base(&self, password: &Password) -> BackupResult<Option<(String, Vec<FileRecord>)>> {
        let doc = self.repo.ledger().fetch()?;
        let Some(latest) = doc.latest().cloned() else {
            info!("No previous backup, running incremental profile as full");
            return Ok(None);
        };

        let parent_id = latest.id.clone();
        let chain = ChainResolver::new(self.repo, password).resolve_from(latest, |id| doc.get(id).cloned())?;
        if let Some(missing) = chain.missing_parent() {
            warn!(missing = %missing, "Parent chain is incomplete, diffing against what remains");
        }
        Ok(Some((parent_id, chain.merged_files().into_values().collect())))
    }

    fn archive_and_upload(
        &self,
        profile: &ProfileConfig,
        source: &Path,
        manifest: Manifest,
        password: &Password,
        dry_run: bool,
        delta: Delta,
    ) -> BackupResult<BackupOutcome> {
        let backup_id = manifest.id()?.to_string();
        let file_count = manifest.files.len();
        let total_size = manifest.total_size();
        let filename = archive_filename(&backup_id);

        let scratch = self.repo.scratch()?;
        let archive_path = scratch.path().join(&filename);

        let payload = build_payload(&manifest, source, profile.compression_level)?;
        let archive_size = write_archive(&archive_path, &payload, password, self.repo.params())?;
        info!(backup = %&backup_id[..backup_id.len().min(12)], files = file_count, bytes = archive_size, "Archive encrypted");

        if dry_run {
            info!("Dry run complete, nothing uploaded");
            return Ok(BackupOutcome::DryRun {
                backup_id,
                file_count,
                total_size,
                archive_size,
            });
        }

        let sha256 = sha256_file(&archive_path)?;
        let commit_sha = self.repo.store().upload_blob(self.repo.repo(), &archive_path)?;
        let signature = self.sign(&archive_path, password);

        let entry = LedgerEntry {
            id: backup_id,
            filename,
            sha256,
            commit_sha,
            size: archive_size,
            created_at: manifest.created_at.clone(),
            file_count,
            verified: false,
            verified_at: None,
            archive_version: 2,
            signature,
        };
        self.repo.ledger().append(entry.clone())?;
        info!(backup = entry.short_id(), commit = %entry.commit_sha, "Backup recorded");

        Ok(BackupOutcome::Uploaded(BackupSummary {
            entry,
            total_size,
            parent_backup_id: delta.parent,
            added: delta.added,
            modified: delta.modified,
            deleted: delta.deleted,
            pruned: None,
        }))
    }

    fn sign(&self, archive_path: &Path, password: &Password) -> Option<String> {
        let signer = self.signer?;
        let signed = std::fs::read(archive_path)
            .map_err(BackupError::from)
            .and_then(|bytes| signer.sign(&bytes, password));
        match signed {
            Ok(sig) => Some(hex::encode(sig)),
            Err(e) => {
                warn!(error = %e, "Signing skipped");
                None
            }
        }
    }
}

impl Delta {
    fn full() -> Self {
        Self {
            parent: None,
            added: 0,
            modified: 0,
            deleted: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::recording::RecordingAudit;
    use crate::crypto::Argon2Params;
    use crate::remote::LocalStore;
    use crate::signing::Ed25519Signer;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    const REPO: &str = "alice/backups";

    struct Fixture {
        dir: TempDir,
        store: Arc<LocalStore>,
        audit: Arc<RecordingAudit>,
        repo: BackupRepository,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(LocalStore::new(dir.path().join("store")));
        let audit = Arc::new(RecordingAudit::default());
        let repo = BackupRepository::new(store.clone(), REPO, dir.path().join("tmp"))
            .with_argon2_params(Argon2Params::new(256, 1, 1))
            .with_audit(audit.clone());
        fs::create_dir_all(dir.path().join("src")).unwrap();
        Fixture {
            dir,
            store,
            audit,
            repo,
        }
    }

    fn profile(f: &Fixture, mode: BackupMode) -> ProfileConfig {
        let mut p = ProfileConfig::new("docs", f.dir.path().join("src").to_string_lossy(), REPO);
        p.backup_mode = mode;
        p
    }

    fn write(f: &Fixture, rel: &str, body: &str) {
        let path = f.dir.path().join("src").join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    fn uploaded(outcome: BackupOutcome) -> BackupSummary {
        match outcome {
            BackupOutcome::Uploaded(s) => s,
            other => panic!("expected upload, got {:?}", other),
        }
    }

    #[test]
    fn test_full_backup_uploads_and_records() {
        let f = fixture();
        write(&f, "a.txt", "alpha");
        write(&f, "nested/b.txt", "beta");

        let pw = Password::new("p");
        let summary = uploaded(BackupService::new(&f.repo).run(&profile(&f, BackupMode::Full), &pw, false).unwrap());

        assert_eq!(summary.entry.file_count, 2);
        assert_eq!(summary.entry.archive_version, 2);
        assert_eq!(summary.entry.filename, archive_filename(&summary.entry.id));
        assert_eq!(f.store.list_blobs(REPO).unwrap(), vec![summary.entry.filename.clone()]);
        assert_eq!(f.repo.ledger().list().unwrap(), vec![summary.entry.clone()]);
        assert_eq!(f.audit.operations(), vec![(Operation::Backup, Status::Success)]);

        // Scratch space is cleaned up
        assert_eq!(fs::read_dir(f.dir.path().join("tmp")).unwrap().count(), 0);
    }

    #[test]
    fn test_dry_run_uploads_nothing() {
        let f = fixture();
        write(&f, "a.txt", "alpha");

        let outcome = BackupService::new(&f.repo)
            .run(&profile(&f, BackupMode::Full), &Password::new("p"), true)
            .unwrap();
        match outcome {
            BackupOutcome::DryRun { file_count, archive_size, .. } => {
                assert_eq!(file_count, 1);
                assert!(archive_size > 68);
            }
            other => panic!("expected dry run, got {:?}", other),
        }
        assert!(f.store.list_blobs(REPO).unwrap().is_empty());
        assert!(f.repo.ledger().list().unwrap().is_empty());
    }

    #[test]
    fn test_incremental_carries_only_changes() {
        let f = fixture();
        write(&f, "keep.txt", "same");
        write(&f, "edit.txt", "v1");
        let pw = Password::new("p");
        let service = BackupService::new(&f.repo);
        let inc = profile(&f, BackupMode::Incremental);

        let first = uploaded(service.run(&inc, &pw, false).unwrap());
        assert_eq!(first.entry.file_count, 2);
        assert!(first.parent_backup_id.is_none());

        write(&f, "edit.txt", "v2");
        write(&f, "new.txt", "fresh");
        let second = uploaded(service.run(&inc, &pw, false).unwrap());
        assert_eq!(second.parent_backup_id.as_deref(), Some(first.entry.id.as_str()));
        assert_eq!(second.entry.file_count, 2);
        assert_eq!((second.added, second.modified, second.deleted), (1, 1, 0));
    }

    #[test]
    fn test_incremental_without_changes_is_skipped() {
        let f = fixture();
        write(&f, "a.txt", "alpha");
        let pw = Password::new("p");
        let service = BackupService::new(&f.repo);
        let inc = profile(&f, BackupMode::Incremental);

        let first = uploaded(service.run(&inc, &pw, false).unwrap());
        match service.run(&inc, &pw, false).unwrap() {
            BackupOutcome::Unchanged { parent_backup_id } => assert_eq!(parent_backup_id, first.entry.id),
            other => panic!("expected unchanged, got {:?}", other),
        }
        assert_eq!(f.repo.ledger().list().unwrap().len(), 1);
    }

    #[test]
    fn test_missing_source_fails_and_audits() {
        let f = fixture();
        let mut p = profile(&f, BackupMode::Full);
        p.source_dir = f.dir.path().join("nope").to_string_lossy().into_owned();

        assert!(BackupService::new(&f.repo).run(&p, &Password::new("p"), false).is_err());
        assert_eq!(f.audit.operations(), vec![(Operation::Backup, Status::Failure)]);
    }

    #[test]
    fn test_empty_password_rejected() {
        let f = fixture();
        write(&f, "a.txt", "alpha");
        let err = BackupService::new(&f.repo)
            .run(&profile(&f, BackupMode::Full), &Password::new(""), false)
            .unwrap_err();
        assert!(matches!(err, BackupError::Validation(_)));
    }

    #[test]
    fn test_retention_runs_after_backup() {
        let f = fixture();
        let pw = Password::new("p");
        let mut p = profile(&f, BackupMode::Full);
        p.max_backups = Some(1);
        let service = BackupService::new(&f.repo);

        write(&f, "a.txt", "one");
        let first = uploaded(service.run(&p, &pw, false).unwrap());
        // Keep created_at strictly increasing between runs
        std::thread::sleep(std::time::Duration::from_millis(5));
        write(&f, "a.txt", "two");
        let second = uploaded(service.run(&p, &pw, false).unwrap());

        let pruned = second.pruned.unwrap();
        assert_eq!(pruned.pruned, vec![first.entry.short_id().to_string()]);
        let ids: Vec<String> = f.repo.ledger().list().unwrap().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![second.entry.id]);
    }

    #[test]
    fn test_signed_backup_stores_signature() {
        let f = fixture();
        write(&f, "a.txt", "alpha");
        let pw = Password::new("p");
        let signer = Ed25519Signer::new(f.dir.path().join("key.tbk"), f.dir.path().join("key.pub"));
        signer.generate(&pw, &Argon2Params::new(256, 1, 1)).unwrap();

        let summary = uploaded(
            BackupService::new(&f.repo)
                .with_signer(&signer)
                .run(&profile(&f, BackupMode::Full), &pw, false)
                .unwrap(),
        );
        let sig = hex::decode(summary.entry.signature.unwrap()).unwrap();
        let blob = f.store.root().join(REPO).join("blobs").join(&summary.entry.filename);
        assert!(signer.verify(&fs::read(blob).unwrap(), &sig).unwrap());
    }

    #[test]
    fn test_signing_failure_still_records_backup() {
        let f = fixture();
        write(&f, "a.txt", "alpha");
        let signer = Ed25519Signer::new(f.dir.path().join("key.tbk"), f.dir.path().join("key.pub"));
        signer.generate(&Password::new("other"), &Argon2Params::new(256, 1, 1)).unwrap();

        let summary = uploaded(
            BackupService::new(&f.repo)
                .with_signer(&signer)
                .run(&profile(&f, BackupMode::Full), &Password::new("p"), false)
                .unwrap(),
        );
        assert!(summary.entry.signature.is_none());
        assert_eq!(f.repo.ledger().list().unwrap().len(), 1);
    }
}
