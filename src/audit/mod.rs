//! Audit logging for TermBackup
//!
//! Every backup, restore, verify, prune, key rotation and daemon run is
//! recorded through an [`AuditSink`]. Recording is fire-and-forget: a sink
//! that fails to write only logs a warning and never aborts the operation.

mod entry;
mod logger;

pub use entry::{AuditEntry, Operation, Status};
pub use logger::AuditLogger;

/// Destination for audit records
pub trait AuditSink: Send + Sync {
    fn record(&self, operation: Operation, profile: &str, status: Status, details: serde_json::Value);
}

/// Sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAudit;

impl AuditSink for NullAudit {
    fn record(&self, _: Operation, _: &str, _: Status, _: serde_json::Value) {}
}
