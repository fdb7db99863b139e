//! Ledger persistence over a [`RemoteStore`]
//!
//! Every mutation re-fetches the document, applies a closure and writes back
//! with the fetched version token. Nothing is cached between calls.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use super::model::{LedgerDocument, LedgerEntry};
use crate::error::{BackupError, BackupResult};
use crate::remote::RemoteStore;

/// New blob location for an entry after re-encryption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobUpdate {
    pub filename: String,
    pub sha256: String,
    pub size: u64,
    pub commit_sha: String,
    pub archive_version: u8,
}

/// Handle on one repository's ledger
pub struct Ledger<'a> {
    store: &'a dyn RemoteStore,
    repo: String,
    conflict_retries: u32,
}

impl<'a> Ledger<'a> {
    pub fn new(store: &'a dyn RemoteStore, repo: impl Into<String>) -> Self {
        Self {
            store,
            repo: repo.into(),
            conflict_retries: 0,
        }
    }

    /// Re-apply a mutation up to `retries` more times after a conflict
    pub fn with_conflict_retries(mut self, retries: u32) -> Self {
        self.conflict_retries = retries;
        self
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// Fetch the document and its version token; an absent ledger is empty
    pub fn fetch_versioned(&self) -> BackupResult<(LedgerDocument, Option<String>)> {
        let meta = self.store.get_metadata(&self.repo)?;
        let doc = match meta.content.as_deref() {
            Some(content) if !content.trim().is_empty() => serde_json::from_str(content)
                .map_err(|e| BackupError::Json(format!("Invalid ledger for {}: {}", self.repo, e)))?,
            _ => LedgerDocument::new(&self.repo),
        };
        Ok((doc, meta.version_token))
    }

    pub fn fetch(&self) -> BackupResult<LedgerDocument> {
        Ok(self.fetch_versioned()?.0)
    }

    /// Read-modify-write with optimistic concurrency
    pub fn update<T, F>(&self, mut mutate: F) -> BackupResult<T>
    where
        F: FnMut(&mut LedgerDocument) -> BackupResult<T>,
    {
        let mut attempt = 0;
        loop {
            let (mut doc, token) = self.fetch_versioned()?;
            let out = mutate(&mut doc)?;
            let content = to_pretty_json(&doc)?;

            match self.store.put_metadata(&self.repo, &content, token.as_deref()) {
                Ok(commit) => {
                    debug!(repo = %self.repo, commit = %commit, "Ledger updated");
                    return Ok(out);
                }
                Err(e) if e.is_conflict() && attempt < self.conflict_retries => {
                    attempt += 1;
                    warn!(repo = %self.repo, attempt, "Ledger changed concurrently, re-applying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Append a new entry
    pub fn append(&self, entry: LedgerEntry) -> BackupResult<()> {
        self.update(|doc| {
            if doc.get(&entry.id).is_some() {
                return Err(BackupError::Validation(format!(
                    "Backup {} is already in the ledger",
                    entry.id
                )));
            }
            doc.backups.push(entry.clone());
            Ok(())
        })
    }

    /// Remove the entry resolved from an id or unique prefix
    pub fn remove(&self, id_or_prefix: &str) -> BackupResult<LedgerEntry> {
        self.update(|doc| {
            let index = doc.resolve_index(id_or_prefix)?;
            Ok(doc.backups.remove(index))
        })
    }

    /// Set the verified flag and timestamp
    pub fn mark_verified(&self, id_or_prefix: &str) -> BackupResult<LedgerEntry> {
        self.update(|doc| {
            let index = doc.resolve_index(id_or_prefix)?;
            let entry = &mut doc.backups[index];
            entry.verified = true;
            entry.verified_at = Some(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false));
            Ok(entry.clone())
        })
    }

    /// Point an entry at a re-encrypted blob; returns the previous entry
    ///
    /// Clears the signature and verification state, which no longer apply.
    pub fn replace_blob(&self, id: &str, update: &BlobUpdate) -> BackupResult<LedgerEntry> {
        self.update(|doc| {
            let index = doc.resolve_index(id)?;
            let entry = &mut doc.backups[index];
            let previous = entry.clone();
            entry.filename = update.filename.clone();
            entry.sha256 = update.sha256.clone();
            entry.size = update.size;
            entry.commit_sha = update.commit_sha.clone();
            entry.archive_version = update.archive_version;
            entry.signature = None;
            entry.verified = false;
            entry.verified_at = None;
            Ok(previous)
        })
    }

    /// Resolve without mutating
    pub fn find(&self, id_or_prefix: &str) -> BackupResult<LedgerEntry> {
        self.fetch()?.resolve(id_or_prefix).cloned()
    }

    /// Most recent entry by creation time
    pub fn latest(&self) -> BackupResult<Option<LedgerEntry>> {
        Ok(self.fetch()?.latest().cloned())
    }

    /// All entries in ledger order
    pub fn list(&self) -> BackupResult<Vec<LedgerEntry>> {
        Ok(self.fetch()?.backups)
    }
}

fn to_pretty_json(doc: &LedgerDocument) -> BackupResult<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    doc.serialize(&mut ser)?;
    String::from_utf8(buf).map_err(|e| BackupError::Json(e.to_string()))
}
