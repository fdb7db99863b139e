//! Manifest comparison
//!
//! Files are keyed by relative path and compared by content hash. Each output
//! list is sorted by path.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::manifest::{FileRecord, Manifest};

/// Result of comparing a current file set against a previous one
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ManifestDiff {
    /// Only in current
    pub added: Vec<FileRecord>,
    /// In both, content hash differs (current record)
    pub modified: Vec<FileRecord>,
    /// Only in previous
    pub deleted: Vec<FileRecord>,
    /// In both, same content hash (current record)
    pub unchanged: Vec<FileRecord>,
}

impl ManifestDiff {
    /// True when nothing was added, modified or deleted
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    /// Files an incremental backup must carry
    pub fn changed_paths(&self) -> impl Iterator<Item = &str> {
        self.added
            .iter()
            .chain(self.modified.iter())
            .map(|f| f.relative_path.as_str())
    }
}

/// Compare two manifests
pub fn diff(current: &Manifest, previous: &Manifest) -> ManifestDiff {
    diff_files(&current.files, &previous.files)
}

/// Compare two file lists
pub fn diff_files(current: &[FileRecord], previous: &[FileRecord]) -> ManifestDiff {
    let current: BTreeMap<&str, &FileRecord> = current
        .iter()
        .map(|f| (f.relative_path.as_str(), f))
        .collect();
    let previous: BTreeMap<&str, &FileRecord> = previous
        .iter()
        .map(|f| (f.relative_path.as_str(), f))
        .collect();

    let mut result = ManifestDiff::default();

    for (path, record) in &current {
        match previous.get(path) {
            None => result.added.push((*record).clone()),
            Some(old) if old.sha256 != record.sha256 => result.modified.push((*record).clone()),
            Some(_) => result.unchanged.push((*record).clone()),
        }
    }

    result.deleted = previous
        .iter()
        .filter(|(path, _)| !current.contains_key(*path))
        .map(|(_, record)| (*record).clone())
        .collect();

    result
}
