//! Audit logger for the append-only audit log
//!
//! Each entry is written as a single JSON line and flushed immediately.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use tracing::warn;

use super::entry::{AuditEntry, Operation, Status};
use super::AuditSink;
use crate::error::{BackupError, BackupResult};

/// Handles writing audit entries to the audit log file (JSONL)
pub struct AuditLogger {
    log_path: PathBuf,
}

impl AuditLogger {
    /// Create a new AuditLogger that writes to the specified path
    pub fn new(log_path: PathBuf) -> Self {
        Self { log_path }
    }

    /// Append the entry as a JSON line
    pub fn log(&self, entry: &AuditEntry) -> BackupResult<()> {
        if let Some(dir) = self.log_path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        // One write per entry keeps concurrent appenders from interleaving
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .map_err(|e| BackupError::Io(format!("Cannot open audit log {}: {}", self.log_path.display(), e)))?;
        file.write_all(&line)?;
        file.flush()?;
        Ok(())
    }

    /// Entries in file order; malformed lines are skipped with a warning
    pub fn read_all(&self) -> BackupResult<Vec<AuditEntry>> {
        let file = match File::open(&self.log_path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(line = index + 1, error = %e, "Skipping malformed audit entry"),
            }
        }
        Ok(entries)
    }

    /// Read the most recent N entries from the log
    pub fn read_recent(&self, count: usize) -> BackupResult<Vec<AuditEntry>> {
        let all_entries = self.read_all()?;
        let start = all_entries.len().saturating_sub(count);
        Ok(all_entries[start..].to_vec())
    }

    pub fn path(&self) -> &PathBuf {
        &self.log_path
    }
}

impl AuditSink for AuditLogger {
    fn record(&self, operation: Operation, profile: &str, status: Status, details: serde_json::Value) {
        let entry = AuditEntry::new(operation, profile, status, details);
        if let Err(e) = self.log(&entry) {
            warn!(error = %e, operation = %operation, "Failed to write audit entry");
        }
    }
}
