//! Audit log CLI command

use super::Context;
use crate::audit::AuditLogger;
use crate::error::BackupResult;

/// Print the most recent audit entries
pub fn handle_audit_command(ctx: &Context, limit: usize) -> BackupResult<()> {
    let logger = AuditLogger::new(ctx.paths.audit_log());
    let entries = logger.read_recent(limit)?;

    if entries.is_empty() {
        println!("No audit entries found.");
        return Ok(());
    }

    for entry in &entries {
        println!("{}", entry.format_human_readable());
    }
    Ok(())
}
