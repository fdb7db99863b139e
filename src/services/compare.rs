//! Compare two stored backups

use tracing::info_span;

use super::repository::BackupRepository;
use crate::crypto::Password;
use crate::diff::{diff, ManifestDiff};
use crate::error::BackupResult;
use crate::ledger::LedgerEntry;
use crate::manifest::Manifest;

/// Both sides of a comparison plus their diff
#[derive(Debug, Clone)]
pub struct Comparison {
    pub older: LedgerEntry,
    pub newer: LedgerEntry,
    pub diff: ManifestDiff,
}

/// Service for comparing backups by manifest
pub struct CompareService<'a> {
    repo: &'a BackupRepository,
}

impl<'a> CompareService<'a> {
    pub fn new(repo: &'a BackupRepository) -> Self {
        Self { repo }
    }

    /// Diff `id_b` against `id_a`, treating `id_a` as the older backup
    ///
    /// Only the manifests are compared. For incremental backups that means
    /// the files each archive carries, not the reconstructed tree.
    pub fn compare(&self, id_a: &str, id_b: &str, password: &Password) -> BackupResult<Comparison> {
        let _span = info_span!("compare", a = %id_a, b = %id_b).entered();

        let doc = self.repo.ledger().fetch()?;
        let older = doc.resolve(id_a)?.clone();
        let newer = doc.resolve(id_b)?.clone();

        let a = self.manifest(&older, password)?;
        let b = self.manifest(&newer, password)?;

        Ok(Comparison {
            diff: diff(&b, &a),
            older,
            newer,
        })
    }

    fn manifest(&self, entry: &LedgerEntry, password: &Password) -> BackupResult<Manifest> {
        let scratch = self.repo.scratch()?;
        self.repo.fetch(entry, password, scratch.path())?.payload.manifest()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProfileConfig;
    use crate::crypto::Argon2Params;
    use crate::remote::LocalStore;
    use crate::services::backup::{BackupOutcome, BackupService};
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_compare_reports_changes_from_older_to_newer() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(LocalStore::new(dir.path().join("store")));
        let repo = BackupRepository::new(store, "alice/backups", dir.path().join("tmp"))
            .with_argon2_params(Argon2Params::new(256, 1, 1));
        let src = dir.path().join("src");
        fs::create_dir_all(&src).unwrap();
        let profile = ProfileConfig::new("docs", src.to_string_lossy(), "alice/backups");
        let pw = Password::new("p");
        let run = || match BackupService::new(&repo).run(&profile, &pw, false).unwrap() {
            BackupOutcome::Uploaded(s) => s.entry.id,
            other => panic!("unexpected {:?}", other),
        };

        fs::write(src.join("kept.txt"), "same").unwrap();
        fs::write(src.join("edited.txt"), "v1").unwrap();
        fs::write(src.join("dropped.txt"), "bye").unwrap();
        let first = run();

        fs::write(src.join("edited.txt"), "v2").unwrap();
        fs::remove_file(src.join("dropped.txt")).unwrap();
        fs::write(src.join("added.txt"), "hi").unwrap();
        let second = run();

        let result = CompareService::new(&repo).compare(&first, &second, &pw).unwrap();
        let paths = |files: &[crate::manifest::FileRecord]| -> Vec<String> {
            files.iter().map(|f| f.relative_path.clone()).collect()
        };
        assert_eq!(paths(&result.diff.added), vec!["added.txt"]);
        assert_eq!(paths(&result.diff.modified), vec!["edited.txt"]);
        assert_eq!(paths(&result.diff.deleted), vec!["dropped.txt"]);
        assert_eq!(paths(&result.diff.unchanged), vec!["kept.txt"]);
        assert_eq!(result.older.id, first);
        assert_eq!(result.newer.id, second);
    }
}
