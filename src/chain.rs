//! Incremental chain resolution
//!
//! An incremental backup stores only the files that changed since its
//! parent. Reconstructing it means walking `parent_backup_id` links back to
//! the full backup and overlaying every payload, oldest first.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use tracing::{debug, info_span, warn};

use crate::archive::{ExtractStats, Payload};
use crate::crypto::Password;
use crate::error::{BackupError, BackupResult};
use crate::ledger::LedgerEntry;
use crate::manifest::{FileRecord, Manifest};
use crate::services::repository::BackupRepository;

/// One decrypted archive in a chain
pub struct ChainLink {
    pub entry: LedgerEntry,
    pub manifest: Manifest,
    pub payload: Payload,
}

/// Outcome of materialising a chain
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MaterializeStats {
    /// Distinct relative paths written
    pub written: Vec<String>,
    pub skipped_existing: usize,
    pub skipped_unsafe: usize,
}

/// A chain ordered oldest (the full backup) to newest (the target)
pub struct ResolvedChain {
    links: Vec<ChainLink>,
    missing_parent: Option<String>,
}

impl ResolvedChain {
    pub fn links(&self) -> &[ChainLink] {
        &self.links
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// The backup the chain was resolved for
    pub fn target(&self) -> Option<&ChainLink> {
        self.links.last()
    }

    /// Parent id that could not be found, when resolution stopped early
    pub fn missing_parent(&self) -> Option<&str> {
        self.missing_parent.as_deref()
    }

    pub fn is_partial(&self) -> bool {
        self.missing_parent.is_some()
    }

    /// File view after overlaying every manifest, newest record per path
    pub fn merged_files(&self) -> BTreeMap<String, FileRecord> {
        let mut merged = BTreeMap::new();
        for link in &self.links {
            for record in &link.manifest.files {
                merged.insert(record.relative_path.clone(), record.clone());
            }
        }
        merged
    }

    /// Write every payload under `dest`, oldest first
    ///
    /// Later payloads overwrite files written by earlier ones. A file that
    /// already existed before the restore is only replaced when `overwrite`
    /// is set.
    pub fn materialize(&self, dest: &Path, overwrite: bool) -> BackupResult<MaterializeStats> {
        std::fs::create_dir_all(dest).map_err(|e| {
            BackupError::Io(format!("Failed to create {}: {}", dest.display(), e))
        })?;

        let mut written: Vec<String> = Vec::new();
        let mut from_chain: HashSet<String> = HashSet::new();
        let mut skipped: HashSet<String> = HashSet::new();
        let mut skipped_unsafe = 0;

        for link in &self.links {
            let mut refused: Vec<String> = Vec::new();
            let ExtractStats {
                written: paths,
                skipped_unsafe: unsafe_count,
                ..
            } = link.payload.extract(dest, |rel| {
                let write = from_chain.contains(rel) || overwrite || !dest.join(rel).exists();
                if !write {
                    refused.push(rel.to_string());
                }
                write
            })?;

            for rel in paths {
                skipped.remove(&rel);
                if from_chain.insert(rel.clone()) {
                    written.push(rel);
                }
            }
            skipped.extend(refused);
            skipped_unsafe += unsafe_count;
            debug!(backup = link.entry.short_id(), "Payload materialised");
        }

        written.sort();
        Ok(MaterializeStats {
            written,
            skipped_existing: skipped.len(),
            skipped_unsafe,
        })
    }
}

/// Follows parent links through the ledger, decrypting each archive
pub struct ChainResolver<'a> {
    repo: &'a BackupRepository,
    password: &'a Password,
}

impl<'a> ChainResolver<'a> {
    pub fn new(repo: &'a BackupRepository, password: &'a Password) -> Self {
        Self { repo, password }
    }

    /// Resolve the chain ending at the backup matching `id_or_prefix`
    pub fn resolve(&self, id_or_prefix: &str) -> BackupResult<ResolvedChain> {
        let doc = self.repo.ledger().fetch()?;
        let target = doc.resolve(id_or_prefix)?.clone();
        self.resolve_from(target, |id| doc.get(id).cloned())
    }

    /// Resolve starting from a known entry, looking parents up with `lookup`
    pub fn resolve_from<F>(&self, start: LedgerEntry, lookup: F) -> BackupResult<ResolvedChain>
    where
        F: Fn(&str) -> Option<LedgerEntry>,
    {
        let _span = info_span!("resolve_chain", backup = start.short_id()).entered();
        let scratch = self.repo.scratch()?;

        let mut links = Vec::new();
        let mut visited = HashSet::new();
        let mut missing_parent = None;
        let mut next = Some(start);

        while let Some(entry) = next.take() {
            if !visited.insert(entry.id.clone()) {
                return Err(BackupError::Integrity(format!(
                    "Backup chain loops back to {}",
                    entry.short_id()
                )));
            }

            let fetched = self.repo.fetch(&entry, self.password, scratch.path())?;
            let manifest = fetched.payload.manifest()?;
            // The payload is in memory, the blob copy is no longer needed
            let _ = std::fs::remove_file(&fetched.path);

            if let Some(parent_id) = manifest.parent_backup_id.clone() {
                match lookup(&parent_id) {
                    Some(parent) => next = Some(parent),
                    None => {
                        warn!(
                            backup = entry.short_id(),
                            parent = %parent_id,
                            "Parent backup missing from ledger, restore will be partial"
                        );
                        missing_parent = Some(parent_id);
                    }
                }
            }

            links.push(ChainLink {
                entry,
                manifest,
                payload: fetched.payload,
            });
        }

        links.reverse();
        debug!(links = links.len(), partial = missing_parent.is_some(), "Chain resolved");
        Ok(ResolvedChain {
            links,
            missing_parent,
        })
    }
}
