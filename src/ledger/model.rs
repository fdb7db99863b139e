//! Ledger document model

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BackupError, BackupResult};

/// Version tag written into new ledgers
pub const TOOL_VERSION: &str = "6.0";

fn default_archive_version() -> u8 {
    1
}

/// One stored backup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Manifest backup id (64 hex chars)
    pub id: String,
    /// Blob name in the remote store
    pub filename: String,
    /// SHA-256 of the encrypted archive file
    pub sha256: String,
    /// Commit id returned by the blob upload
    pub commit_sha: String,
    pub size: u64,
    pub created_at: String,
    pub file_count: usize,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub verified_at: Option<String>,
    /// Defaults to 1 for ledgers written before the field existed
    #[serde(default = "default_archive_version")]
    pub archive_version: u8,
    /// Hex-encoded detached signature over the archive bytes
    #[serde(default)]
    pub signature: Option<String>,
}

impl LedgerEntry {
    /// First 12 characters of the id
    pub fn short_id(&self) -> &str {
        let end = self
            .id
            .char_indices()
            .nth(12)
            .map_or(self.id.len(), |(i, _)| i);
        &self.id[..end]
    }

    /// Parsed creation time, if it is valid RFC 3339
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.created_at)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// The remote JSON document listing every backup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerDocument {
    #[serde(default = "default_tool_version")]
    pub tool_version: String,
    pub repository: String,
    pub created_at: String,
    #[serde(default)]
    pub backups: Vec<LedgerEntry>,
}

fn default_tool_version() -> String {
    TOOL_VERSION.to_string()
}

impl LedgerDocument {
    /// Empty ledger for a repository
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            tool_version: TOOL_VERSION.to_string(),
            repository: repository.into(),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false),
            backups: Vec::new(),
        }
    }

    /// Resolve an exact id or a unique id prefix to an entry index
    pub fn resolve_index(&self, id_or_prefix: &str) -> BackupResult<usize> {
        if id_or_prefix.is_empty() {
            return Err(BackupError::backup_not_found("(empty id)"));
        }

        if let Some(i) = self.backups.iter().position(|b| b.id == id_or_prefix) {
            return Ok(i);
        }

        let matches: Vec<usize> = self
            .backups
            .iter()
            .enumerate()
            .filter(|(_, b)| b.id.starts_with(id_or_prefix))
            .map(|(i, _)| i)
            .collect();

        match matches.as_slice() {
            [] => Err(BackupError::backup_not_found(id_or_prefix)),
            [only] => Ok(*only),
            many => Err(BackupError::AmbiguousId {
                prefix: id_or_prefix.to_string(),
                matches: many.len(),
            }),
        }
    }

    /// Resolve an exact id or a unique id prefix to an entry
    pub fn resolve(&self, id_or_prefix: &str) -> BackupResult<&LedgerEntry> {
        let index = self.resolve_index(id_or_prefix)?;
        Ok(&self.backups[index])
    }

    /// Look up by exact id only
    pub fn get(&self, id: &str) -> Option<&LedgerEntry> {
        self.backups.iter().find(|b| b.id == id)
    }

    /// Entry with the greatest `created_at`
    pub fn latest(&self) -> Option<&LedgerEntry> {
        self.backups.iter().max_by(|a, b| {
            match (a.created_at_utc(), b.created_at_utc()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => a.created_at.cmp(&b.created_at),
            }
        })
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::entry;
    use super::*;

    fn doc() -> LedgerDocument {
        let mut d = LedgerDocument::new("alice/backups");
        d.backups.push(entry("abc111", "2024-01-01T00:00:00+00:00"));
        d.backups.push(entry("abc222", "2024-03-01T00:00:00+00:00"));
        d.backups.push(entry("def333", "2024-02-01T00:00:00+00:00"));
        d
    }

    #[test]
    fn test_resolve_exact() {
        assert_eq!(doc().resolve("abc222").unwrap().id, "abc222");
    }

    #[test]
    fn test_resolve_unique_prefix() {
        assert_eq!(doc().resolve("de").unwrap().id, "def333");
    }

    #[test]
    fn test_resolve_ambiguous_prefix() {
        let err = doc().resolve("abc").unwrap_err();
        assert!(matches!(err, BackupError::AmbiguousId { matches: 2, .. }));
    }

    #[test]
    fn test_exact_match_wins_over_prefix() {
        let mut d = doc();
        d.backups.push(entry("abc", "2024-04-01T00:00:00+00:00"));
        assert_eq!(d.resolve("abc").unwrap().id, "abc");
    }

    #[test]
    fn test_resolve_missing_and_empty() {
        assert!(doc().resolve("zzz").unwrap_err().is_not_found());
        assert!(doc().resolve("").unwrap_err().is_not_found());
    }

    #[test]
    fn test_latest_by_created_at() {
        assert_eq!(doc().latest().unwrap().id, "abc222");
        assert!(LedgerDocument::new("a/b").latest().is_none());
    }

    #[test]
    fn test_legacy_entry_defaults() {
        let raw = r#"{"id":"x","filename":"f","sha256":"s","commit_sha":"c","size":1,
            "created_at":"2024-01-01T00:00:00+00:00","file_count":0}"#;
        let e: LedgerEntry = serde_json::from_str(raw).unwrap();
        assert_eq!(e.archive_version, 1);
        assert!(!e.verified);
        assert!(e.signature.is_none());
    }

    #[test]
    fn test_new_document_fields() {
        let d = LedgerDocument::new("alice/backups");
        assert_eq!(d.tool_version, "6.0");
        assert!(d.backups.is_empty());
        assert!(DateTime::parse_from_rfc3339(&d.created_at).is_ok());
    }

    #[test]
    fn test_short_id() {
        let e = entry("0123456789abcdef", "2024-01-01T00:00:00+00:00");
        assert_eq!(e.short_id(), "0123456789ab");
        assert_eq!(entry("abc", "x").short_id(), "abc");
    }
}
