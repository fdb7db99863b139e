//! Backup display formatting

use super::{format_size, format_timestamp};
use crate::diff::ManifestDiff;
use crate::ledger::LedgerEntry;
use crate::services::{RestoreReport, RotationReport, VerifyReport};

/// Ledger entries as a table, newest first
pub fn format_backup_list(entries: &[LedgerEntry]) -> String {
    if entries.is_empty() {
        return "No backups found.".to_string();
    }

    let mut sorted: Vec<&LedgerEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| {
        (b.created_at_utc(), &b.created_at).cmp(&(a.created_at_utc(), &a.created_at))
    });

    let file_width = sorted
        .iter()
        .map(|e| e.filename.len())
        .max()
        .unwrap_or(8)
        .max(8);

    let mut output = String::new();
    output.push_str(&format!(
        "{:<12}  {:<file_width$}  {:<19}  {:>10}  {:>6}  {}\n",
        "ID",
        "Filename",
        "Created",
        "Size",
        "Files",
        "Status",
        file_width = file_width,
    ));
    output.push_str(&format!(
        "{:-<12}  {:-<file_width$}  {:-<19}  {:->10}  {:->6}  {:-<8}\n",
        "",
        "",
        "",
        "",
        "",
        "",
        file_width = file_width,
    ));

    for entry in &sorted {
        let status = if entry.verified { "VERIFIED" } else { "PENDING" };
        output.push_str(&format!(
            "{:<12}  {:<file_width$}  {:<19}  {:>10}  {:>6}  {}\n",
            entry.short_id(),
            entry.filename,
            format_timestamp(&entry.created_at),
            format_size(entry.size),
            entry.file_count,
            status,
            file_width = file_width,
        ));
    }

    let total: u64 = sorted.iter().map(|e| e.size).sum();
    output.push_str(&format!(
        "\n{} backup(s), {} stored\n",
        sorted.len(),
        format_size(total)
    ));

    output
}

/// One line per changed file, prefixed `+`, `~` or `-`
pub fn format_diff(diff: &ManifestDiff) -> String {
    if diff.is_empty() {
        return format!("No differences ({} unchanged).\n", diff.unchanged.len());
    }

    let mut output = String::new();
    for file in &diff.added {
        output.push_str(&format!("+ {}\n", file.relative_path));
    }
    for file in &diff.modified {
        output.push_str(&format!("~ {}\n", file.relative_path));
    }
    for file in &diff.deleted {
        output.push_str(&format!("- {}\n", file.relative_path));
    }
    output.push_str(&format!(
        "\n{} added, {} modified, {} deleted, {} unchanged\n",
        diff.added.len(),
        diff.modified.len(),
        diff.deleted.len(),
        diff.unchanged.len()
    ));
    output
}

/// Verification checklist with a pass count
pub fn format_checklist(report: &VerifyReport) -> String {
    let mut output = String::new();
    for check in &report.checks {
        let mark = if check.passed { "[PASS]" } else { "[FAIL]" };
        output.push_str(&format!("{} {:<22} {}\n", mark, check.name, check.detail));
    }

    let encryption = match report.archive_version {
        Some(2) => "AES-256-GCM + Argon2id",
        Some(1) => "AES-256-CBC + PBKDF2",
        _ => "unknown",
    };
    output.push_str(&format!(
        "\n{}/{} checks passed (archive v{}, {})\n",
        report.passed_count(),
        report.checks.len(),
        report
            .archive_version
            .map_or_else(|| "?".to_string(), |v| v.to_string()),
        encryption
    ));
    output
}

pub fn format_restore_report(report: &RestoreReport) -> String {
    let mut output = String::new();

    if report.dry_run {
        output.push_str("Dry run, files that would be restored:\n");
        for file in &report.files {
            output.push_str(&format!("  {:<50} {:>10}\n", file.relative_path, format_size(file.size)));
        }
        output.push_str(&format!("Total: {} file(s)\n", report.files.len()));
    } else {
        output.push_str(&format!(
            "Restored {} file(s) to {}\n",
            report.files.len(),
            report.destination.display()
        ));
        if report.skipped_existing > 0 {
            output.push_str(&format!(
                "Skipped {} existing file(s) (use --overwrite to replace)\n",
                report.skipped_existing
            ));
        }
        if report.skipped_unsafe > 0 {
            output.push_str(&format!("Skipped {} unsafe path(s)\n", report.skipped_unsafe));
        }
    }

    if let Some(parent) = &report.missing_parent {
        output.push_str(&format!(
            "Warning: parent backup {} is missing, restore is partial\n",
            &parent[..parent.len().min(12)]
        ));
    }
    output
}

pub fn format_rotation_report(report: &RotationReport) -> String {
    let mut output = format!("Re-encrypted {} backup(s)\n", report.rotated.len());
    for (id, error) in &report.failed {
        output.push_str(&format!("  failed {}: {}\n", id, error));
    }
    for name in &report.orphaned {
        output.push_str(&format!("  orphaned blob {}\n", name));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::model::fixtures::entry;
    use crate::services::Check;

    #[test]
    fn test_backup_list_newest_first() {
        let mut older = entry("aaaaaaaaaaaaaaaa", "2024-01-01T00:00:00+00:00");
        older.verified = true;
        let newer = entry("bbbbbbbbbbbbbbbb", "2024-02-01T00:00:00+00:00");

        let output = format_backup_list(&[older, newer]);
        let lines: Vec<&str> = output.lines().collect();
        assert!(lines[0].starts_with("ID"));
        assert!(lines[2].starts_with("bbbbbbbbbbbb"));
        assert!(lines[2].ends_with("PENDING"));
        assert!(lines[3].starts_with("aaaaaaaaaaaa"));
        assert!(lines[3].ends_with("VERIFIED"));
        assert!(output.contains("2 backup(s)"));
    }

    #[test]
    fn test_empty_list() {
        assert_eq!(format_backup_list(&[]), "No backups found.");
    }

    #[test]
    fn test_checklist() {
        let report = VerifyReport {
            backup_id: "abc".into(),
            archive_version: Some(2),
            checks: vec![
                Check {
                    name: "SHA-256 Checksum",
                    passed: true,
                    detail: "Verified".into(),
                    critical: true,
                },
                Check {
                    name: "Ledger Update",
                    passed: false,
                    detail: "Non-critical".into(),
                    critical: false,
                },
            ],
        };
        let output = format_checklist(&report);
        assert!(output.contains("[PASS] SHA-256 Checksum"));
        assert!(output.contains("[FAIL] Ledger Update"));
        assert!(output.contains("1/2 checks passed (archive v2, AES-256-GCM + Argon2id)"));
    }
}
