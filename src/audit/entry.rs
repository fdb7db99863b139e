//! Audit entry data structures
//!
//! Defines the operations that are audited and the JSON line written for
//! each of them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Types of operations that can be audited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    Backup,
    Restore,
    Verify,
    Prune,
    RotateKey,
    Daemon,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Backup => write!(f, "backup"),
            Operation::Restore => write!(f, "restore"),
            Operation::Verify => write!(f, "verify"),
            Operation::Prune => write!(f, "prune"),
            Operation::RotateKey => write!(f, "rotate-key"),
            Operation::Daemon => write!(f, "daemon"),
        }
    }
}

/// Outcome recorded for an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    /// Finished with some per-entry failures
    Partial,
    Failure,
    Skipped,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Success => write!(f, "success"),
            Status::Partial => write!(f, "partial"),
            Status::Failure => write!(f, "failure"),
            Status::Skipped => write!(f, "skipped"),
        }
    }
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// When the operation finished (UTC)
    pub timestamp: DateTime<Utc>,

    pub operation: Operation,

    /// Profile name, or the repository when no profile was involved
    pub profile: String,

    pub status: Status,

    /// Operation-specific details (backup id, counts, error text)
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

impl AuditEntry {
    pub fn new(
        operation: Operation,
        profile: impl Into<String>,
        status: Status,
        details: serde_json::Value,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            profile: profile.into(),
            status,
            details,
        }
    }

    /// Format the entry for human-readable output
    pub fn format_human_readable(&self) -> String {
        let mut output = format!(
            "[{}] {} {} {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.operation,
            self.profile,
            self.status
        );

        if !self.details.is_null() {
            output.push_str(&format!("\n  {}", self.details));
        }

        output
    }
}
