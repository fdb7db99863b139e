//! Retention enforcement
//!
//! Drops every entry the policy selects from the ledger, then deletes its
//! blob. A blob that survives is reported as orphaned; the ledger never
//! points at a deleted blob. A failure on one entry is logged and the loop
//! moves on.

use serde_json::json;
use tracing::{info, info_span, warn};

use super::repository::BackupRepository;
use crate::audit::{Operation, Status};
use crate::error::BackupResult;
use crate::events::BackupEvent;
use crate::retention::RetentionPolicy;

/// Result of a pruning pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PruneReport {
    /// Short ids of removed backups
    pub pruned: Vec<String>,
    /// Short id and error text for entries that could not be removed
    pub failed: Vec<(String, String)>,
    /// Blobs whose ledger entry is gone but which could not be deleted
    pub orphaned: Vec<String>,
}

impl PruneReport {
    pub fn is_empty(&self) -> bool {
        self.pruned.is_empty() && self.failed.is_empty() && self.orphaned.is_empty()
    }
}

/// Service for retention enforcement
pub struct PruneService<'a> {
    repo: &'a BackupRepository,
}

impl<'a> PruneService<'a> {
    pub fn new(repo: &'a BackupRepository) -> Self {
        Self { repo }
    }

    /// Entries the policy would remove, without touching anything
    pub fn plan(&self, policy: &RetentionPolicy) -> BackupResult<Vec<crate::ledger::LedgerEntry>> {
        let entries = self.repo.ledger().list()?;
        Ok(policy.select_for_pruning(&entries))
    }

    /// Apply the policy; `profile` labels the audit record
    pub fn enforce(&self, policy: &RetentionPolicy, profile: &str) -> BackupResult<PruneReport> {
        let _span = info_span!("prune", repo = %self.repo.repo()).entered();

        let doomed = self.plan(policy)?;
        let mut report = PruneReport::default();
        if doomed.is_empty() {
            return Ok(report);
        }

        info!(count = doomed.len(), "Pruning old backups");
        let ledger = self.repo.ledger();

        for entry in &doomed {
            if let Err(e) = ledger.remove(&entry.id) {
                warn!(backup = entry.short_id(), error = %e, "Failed to prune backup");
                report.failed.push((entry.short_id().to_string(), e.to_string()));
                continue;
            }
            report.pruned.push(entry.short_id().to_string());

            match self.repo.store().delete_blob(self.repo.repo(), &entry.filename) {
                Ok(()) => info!(backup = entry.short_id(), file = %entry.filename, "Removed"),
                Err(e) if e.is_not_found() => {
                    info!(backup = entry.short_id(), file = %entry.filename, "Removed, blob was already gone")
                }
                Err(e) => {
                    warn!(file = %entry.filename, error = %e, "Ledger entry removed but blob is orphaned");
                    report.orphaned.push(entry.filename.clone());
                }
            }
        }

        let clean = report.failed.is_empty() && report.orphaned.is_empty();
        let status = match (report.pruned.is_empty(), clean) {
            (_, true) => Status::Success,
            (false, false) => Status::Partial,
            (true, false) => Status::Failure,
        };
        self.repo.audit(
            Operation::Prune,
            profile,
            status,
            json!({
                "pruned": report.pruned,
                "failed": report.failed.len(),
                "orphaned": report.orphaned,
            }),
        );
        if !report.pruned.is_empty() {
            self.repo.publish(&BackupEvent::Pruned {
                repo: self.repo.repo().to_string(),
                backup_ids: report.pruned.clone(),
            });
        }

        Ok(report)
    }
}
