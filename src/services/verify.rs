//! Backup verification checklist
//!
//! Checks run in order: archive checksum against the ledger, decryption,
//! manifest self-certification, the optional signature and finally the
//! ledger update. A failed checksum, decryption or manifest check stops the
//! run. A failed ledger update is reported but does not fail verification.

use serde::Serialize;
use serde_json::json;
use tracing::{info, info_span, warn};

use super::repository::BackupRepository;
use crate::archive::{read_and_decrypt, read_header, Payload};
use crate::audit::{Operation, Status};
use crate::crypto::Password;
use crate::error::{BackupError, BackupResult};
use crate::events::BackupEvent;
use crate::file_io::sha256_file;
use crate::manifest::id_from_raw_json;
use crate::signing::ArchiveSigner;

/// One line of the checklist
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Check {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
    /// Whether a failure makes the whole verification fail
    pub critical: bool,
}

/// Outcome of verifying one backup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub backup_id: String,
    /// Format version read from the header, when decoding got that far
    pub archive_version: Option<u8>,
    pub checks: Vec<Check>,
}

impl VerifyReport {
    /// All critical checks passed
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed || !c.critical)
    }

    pub fn passed_count(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    /// Convert a failed report into an error naming the first failed check
    pub fn into_result(self) -> BackupResult<Self> {
        match self.checks.iter().find(|c| c.critical && !c.passed) {
            None => Ok(self),
            Some(check) if check.name == DECRYPTION => Err(BackupError::Authentication(format!(
                "{} for backup {}: {}",
                check.name, self.backup_id, check.detail
            ))),
            Some(check) => Err(BackupError::Integrity(format!(
                "{} failed for backup {}: {}",
                check.name, self.backup_id, check.detail
            ))),
        }
    }

    fn push(&mut self, name: &'static str, passed: bool, detail: impl Into<String>, critical: bool) -> bool {
        self.checks.push(Check {
            name,
            passed,
            detail: detail.into(),
            critical,
        });
        passed
    }
}

const CHECKSUM: &str = "SHA-256 Checksum";
const DECRYPTION: &str = "Encryption Integrity";
const MANIFEST: &str = "Manifest Integrity";
const SIGNATURE: &str = "Signature";
const LEDGER: &str = "Ledger Update";

/// Service for verifying stored backups
pub struct VerifyService<'a> {
    repo: &'a BackupRepository,
    signer: Option<&'a dyn ArchiveSigner>,
}

impl<'a> VerifyService<'a> {
    pub fn new(repo: &'a BackupRepository) -> Self {
        Self { repo, signer: None }
    }

    /// Check stored signatures with `signer`
    pub fn with_signer(mut self, signer: &'a dyn ArchiveSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Verify the backup matching `id_or_prefix`
    ///
    /// Lookup and download failures are errors; failed checks are reported
    /// in the returned checklist.
    pub fn verify(&self, id_or_prefix: &str, password: &Password, profile: &str) -> BackupResult<VerifyReport> {
        let _span = info_span!("verify", backup = %id_or_prefix).entered();

        let entry = self.repo.ledger().find(id_or_prefix)?;
        let scratch = self.repo.scratch()?;
        let path = self.repo.download(&entry, scratch.path())?;

        let mut report = VerifyReport {
            backup_id: entry.id.clone(),
            archive_version: None,
            checks: Vec::new(),
        };

        let digest = sha256_file(&path)?;
        let checksum_ok = digest == entry.sha256;
        report.push(
            CHECKSUM,
            checksum_ok,
            if checksum_ok { "Verified" } else { "Mismatch, archive may be tampered" },
            true,
        );

        if checksum_ok {
            self.check_contents(&mut report, &path, password, &entry)?;
        }

        let passed = report.passed();
        if passed {
            info!(checks = report.passed_count(), "Verification passed");
        } else {
            warn!(checks = report.passed_count(), total = report.checks.len(), "Verification failed");
        }
        self.repo.audit(
            Operation::Verify,
            profile,
            if passed { Status::Success } else { Status::Failure },
            json!({
                "backup_id": entry.short_id(),
                "checks_passed": report.passed_count(),
                "checks_total": report.checks.len(),
            }),
        );
        self.repo.publish(&BackupEvent::Verified {
            backup_id: entry.id.clone(),
            passed,
        });

        Ok(report)
    }

    fn check_contents(
        &self,
        report: &mut VerifyReport,
        path: &std::path::Path,
        password: &Password,
        entry: &crate::ledger::LedgerEntry,
    ) -> BackupResult<()> {
        let decrypted = read_header(path).and_then(|header| {
            report.archive_version = Some(header.version());
            read_and_decrypt(path, password, &header)
        });
        let payload = match decrypted {
            Ok(bytes) => {
                report.push(DECRYPTION, true, "Verified", true);
                Payload::new(bytes)
            }
            Err(e) => {
                report.push(DECRYPTION, false, format!("Failed: {}", e), true);
                return Ok(());
            }
        };

        let manifest_ok = match payload.manifest_json().and_then(|raw| id_from_raw_json(&raw)) {
            Ok((Some(stored), recomputed)) if stored == recomputed && stored == entry.id => {
                report.push(MANIFEST, true, "Verified", true)
            }
            Ok((Some(stored), recomputed)) if stored != recomputed => {
                report.push(MANIFEST, false, "ID mismatch", true)
            }
            Ok((Some(_), _)) => report.push(MANIFEST, false, "Manifest id differs from ledger id", true),
            Ok((None, _)) => report.push(MANIFEST, false, "Manifest has no backup_id", true),
            Err(e) => report.push(MANIFEST, false, format!("Unreadable manifest: {}", e), true),
        };
        if !manifest_ok {
            return Ok(());
        }

        if let (Some(signer), Some(signature)) = (self.signer, entry.signature.as_deref()) {
            let valid = hex::decode(signature)
                .map_err(|e| BackupError::Crypto(format!("Invalid signature encoding: {}", e)))
                .and_then(|sig| {
                    let bytes = std::fs::read(path)?;
                    signer.verify(&bytes, &sig)
                });
            match valid {
                Ok(true) => report.push(SIGNATURE, true, "Valid Ed25519 signature", true),
                Ok(false) => report.push(SIGNATURE, false, "Signature does not match archive", true),
                Err(e) => report.push(SIGNATURE, false, format!("Could not check: {}", e), true),
            };
        }

        if report.passed() {
            match self.repo.ledger().mark_verified(&entry.id) {
                Ok(_) => report.push(LEDGER, true, "Marked as verified", false),
                Err(e) => {
                    warn!(error = %e, "Could not mark backup as verified");
                    report.push(LEDGER, false, "Non-critical: could not update", false)
                }
            };
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::recording::RecordingAudit;
    use crate::config::ProfileConfig;
    use crate::crypto::Argon2Params;
    use crate::ledger::LedgerEntry;
    use crate::remote::LocalStore;
    use crate::services::backup::{BackupOutcome, BackupService};
    use crate::signing::Ed25519Signer;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    const REPO: &str = "alice/backups";

    fn setup() -> (TempDir, Arc<LocalStore>, Arc<RecordingAudit>, BackupRepository, ProfileConfig) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(LocalStore::new(dir.path().join("store")));
        let audit = Arc::new(RecordingAudit::default());
        let repo = BackupRepository::new(store.clone(), REPO, dir.path().join("tmp"))
            .with_argon2_params(Argon2Params::new(256, 1, 1))
            .with_audit(audit.clone());
        let src = dir.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("one.txt"), "1").unwrap();
        fs::write(src.join("two.txt"), "2").unwrap();
        let profile = ProfileConfig::new("docs", src.to_string_lossy(), REPO);
        (dir, store, audit, repo, profile)
    }

    fn backup(service: BackupService<'_>, profile: &ProfileConfig) -> LedgerEntry {
        match service.run(profile, &Password::new("p"), false).unwrap() {
            BackupOutcome::Uploaded(s) => s.entry,
            other => panic!("unexpected {:?}", other),
        }
    }

    fn blob_path(store: &LocalStore, entry: &LedgerEntry) -> std::path::PathBuf {
        store.root().join(REPO).join("blobs").join(&entry.filename)
    }

    #[test]
    fn test_clean_backup_passes_all_checks() {
        let (_dir, _, audit, repo, profile) = setup();
        let entry = backup(BackupService::new(&repo), &profile);

        let report = VerifyService::new(&repo)
            .verify(entry.short_id(), &Password::new("p"), "docs")
            .unwrap();

        let names: Vec<&str> = report.checks.iter().map(|c| c.name).collect();
        assert_eq!(names, vec![CHECKSUM, DECRYPTION, MANIFEST, LEDGER]);
        assert!(report.passed());
        assert_eq!(report.archive_version, Some(2));
        assert!(repo.ledger().find(&entry.id).unwrap().verified);
        assert!(audit.operations().contains(&(Operation::Verify, Status::Success)));
    }

    #[test]
    fn test_tampered_blob_fails_checksum() {
        let (_dir, store, _, repo, profile) = setup();
        let entry = backup(BackupService::new(&repo), &profile);

        let path = blob_path(&store, &entry);
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        fs::write(&path, bytes).unwrap();

        let report = VerifyService::new(&repo)
            .verify(&entry.id, &Password::new("p"), "docs")
            .unwrap();
        assert!(!report.passed());
        assert_eq!(report.checks.len(), 1);
        assert!(matches!(report.into_result(), Err(BackupError::Integrity(_))));
        assert!(!repo.ledger().find(&entry.id).unwrap().verified);
    }

    #[test]
    fn test_wrong_password_fails_decryption() {
        let (_dir, _, audit, repo, profile) = setup();
        let entry = backup(BackupService::new(&repo), &profile);

        let report = VerifyService::new(&repo)
            .verify(&entry.id, &Password::new("nope"), "docs")
            .unwrap();
        assert_eq!(report.checks.len(), 2);
        assert!(!report.checks[1].passed);
        assert!(report.into_result().unwrap_err().is_authentication());
        assert!(audit.operations().contains(&(Operation::Verify, Status::Failure)));
    }

    #[test]
    fn test_signature_checked_when_present() {
        let (dir, _, _, repo, profile) = setup();
        let signer = Ed25519Signer::new(dir.path().join("k.tbk"), dir.path().join("k.pub"));
        signer.generate(&Password::new("p"), &Argon2Params::new(256, 1, 1)).unwrap();
        let entry = backup(BackupService::new(&repo).with_signer(&signer), &profile);
        assert!(entry.signature.is_some());

        let report = VerifyService::new(&repo)
            .with_signer(&signer)
            .verify(&entry.id, &Password::new("p"), "docs")
            .unwrap();
        assert!(report.passed());
        assert!(report.checks.iter().any(|c| c.name == SIGNATURE && c.passed));
    }

    #[test]
    fn test_unknown_backup_is_error() {
        let (_dir, _, _, repo, profile) = setup();
        backup(BackupService::new(&repo), &profile);
        assert!(VerifyService::new(&repo)
            .verify("zzz", &Password::new("p"), "docs")
            .unwrap_err()
            .is_not_found());
    }
}
