//! Backup CLI commands
//!
//! Handlers for creating, listing, restoring, verifying, comparing, pruning
//! and re-keying backups of a profile.

use std::path::Path;

use super::{prompt_new_password, Context};
use crate::display::{
    format_backup_list, format_checklist, format_diff, format_restore_report,
    format_rotation_report, format_size,
};
use crate::error::{BackupError, BackupResult};
use crate::services::{
    BackupOutcome, BackupService, CompareService, KeyRotator, PruneService, RestoreOptions,
    RestoreService, VerifyService,
};
use crate::signing::{ArchiveSigner, Ed25519Signer};

/// Run one backup of `profile_name`
pub fn handle_backup(ctx: &Context, profile_name: &str, dry_run: bool) -> BackupResult<()> {
    let profile = ctx.profile(profile_name)?;
    let repo = ctx.repository(&profile.repo)?;
    let password = ctx.password(&profile.name)?;
    let signer = Ed25519Signer::load(&ctx.paths);

    let mut service = BackupService::new(&repo).with_workers(ctx.settings.hash_workers);
    if let Some(signer) = &signer {
        service = service.with_signer(signer as &dyn ArchiveSigner);
    }

    println!("Backing up {} to {}...", profile.source_dir, profile.repo);
    print_outcome(&service.run(profile, &password, dry_run)?);
    Ok(())
}

pub(crate) fn print_outcome(outcome: &BackupOutcome) {
    match outcome {
        BackupOutcome::Uploaded(summary) => {
            println!("Backup created: {}", summary.entry.short_id());
            println!("Archive:  {}", summary.entry.filename);
            println!(
                "Files:    {} ({} uncompressed)",
                summary.entry.file_count,
                format_size(summary.total_size)
            );
            println!("Size:     {}", format_size(summary.entry.size));
            if let Some(parent) = &summary.parent_backup_id {
                println!(
                    "Parent:   {} ({} added, {} modified, {} deleted)",
                    &parent[..parent.len().min(12)],
                    summary.added,
                    summary.modified,
                    summary.deleted
                );
            }
            if summary.entry.signature.is_some() {
                println!("Signed:   yes");
            }
            if let Some(report) = &summary.pruned {
                if !report.pruned.is_empty() {
                    println!("Pruned:   {}", report.pruned.join(", "));
                }
                for (id, error) in &report.failed {
                    println!("Prune failed for {}: {}", id, error);
                }
                for name in &report.orphaned {
                    println!("Orphaned blob: {}", name);
                }
            }
        }
        BackupOutcome::DryRun {
            backup_id,
            file_count,
            total_size,
            archive_size,
        } => {
            println!("Dry run, nothing uploaded.");
            println!("Backup id: {}", &backup_id[..backup_id.len().min(12)]);
            println!("Files:     {} ({})", file_count, format_size(*total_size));
            println!("Archive:   {}", format_size(*archive_size));
        }
        BackupOutcome::Unchanged { parent_backup_id } => {
            println!(
                "No changes since {}, nothing to back up.",
                &parent_backup_id[..parent_backup_id.len().min(12)]
            );
        }
    }
}

pub fn handle_list(ctx: &Context, profile_name: &str) -> BackupResult<()> {
    let profile = ctx.profile(profile_name)?;
    let repo = ctx.repository(&profile.repo)?;
    let entries = repo.ledger().list()?;
    println!("{}", format_backup_list(&entries));
    Ok(())
}

pub fn handle_restore(
    ctx: &Context,
    profile_name: &str,
    backup_id: &str,
    dest: &Path,
    options: RestoreOptions,
) -> BackupResult<()> {
    let profile = ctx.profile(profile_name)?;
    let repo = ctx.repository(&profile.repo)?;
    let password = ctx.password(&profile.name)?;

    let report = RestoreService::new(&repo).restore(backup_id, &password, dest, options, &profile.name)?;
    print!("{}", format_restore_report(&report));
    if report.chain_length > 1 {
        println!("Applied a chain of {} backup(s)", report.chain_length);
    }
    Ok(())
}

pub fn handle_verify(ctx: &Context, profile_name: &str, backup_id: &str) -> BackupResult<()> {
    let profile = ctx.profile(profile_name)?;
    let repo = ctx.repository(&profile.repo)?;
    let password = ctx.password(&profile.name)?;
    let signer = Ed25519Signer::load(&ctx.paths);

    let mut service = VerifyService::new(&repo);
    if let Some(signer) = &signer {
        service = service.with_signer(signer as &dyn ArchiveSigner);
    }

    let report = service.verify(backup_id, &password, &profile.name)?;
    print!("{}", format_checklist(&report));
    report.into_result().map(|_| ())
}

pub fn handle_compare(ctx: &Context, profile_name: &str, older: &str, newer: &str) -> BackupResult<()> {
    let profile = ctx.profile(profile_name)?;
    let repo = ctx.repository(&profile.repo)?;
    let password = ctx.password(&profile.name)?;

    let comparison = CompareService::new(&repo).compare(older, newer, &password)?;
    println!(
        "Comparing {} -> {}",
        comparison.older.short_id(),
        comparison.newer.short_id()
    );
    println!();
    print!("{}", format_diff(&comparison.diff));
    Ok(())
}

pub fn handle_prune(ctx: &Context, profile_name: &str, dry_run: bool) -> BackupResult<()> {
    let profile = ctx.profile(profile_name)?;
    let policy = profile.retention();
    if !policy.is_enabled() {
        println!("Profile '{}' has no retention policy.", profile.name);
        println!("Set one with --max-backups or --retention-days when adding the profile.");
        return Ok(());
    }

    let repo = ctx.repository(&profile.repo)?;
    let service = PruneService::new(&repo);

    if dry_run {
        let doomed = service.plan(&policy)?;
        if doomed.is_empty() {
            println!("Nothing to prune.");
        } else {
            println!("Would prune {} backup(s):", doomed.len());
            println!("{}", format_backup_list(&doomed));
        }
        return Ok(());
    }

    let report = service.enforce(&policy, &profile.name)?;
    if report.is_empty() {
        println!("Nothing to prune.");
        return Ok(());
    }
    println!("Pruned {} backup(s)", report.pruned.len());
    for id in &report.pruned {
        println!("  {}", id);
    }
    for (id, error) in &report.failed {
        println!("  failed {}: {}", id, error);
    }
    for name in &report.orphaned {
        println!("  orphaned blob {}", name);
    }
    if report.failed.is_empty() {
        Ok(())
    } else {
        Err(BackupError::Validation(format!(
            "{} backup(s) could not be pruned",
            report.failed.len()
        )))
    }
}

pub fn handle_rotate_key(ctx: &Context, profile_name: &str) -> BackupResult<()> {
    let profile = ctx.profile(profile_name)?;
    let repo = ctx.repository(&profile.repo)?;
    let old = ctx.password(&profile.name)?;
    let new = prompt_new_password("New password: ")?;

    let report = KeyRotator::new(&repo).rotate(&old, &new, &profile.name)?;
    print!("{}", format_rotation_report(&report));
    if !report.failed.is_empty() {
        println!("Backups that failed keep the old password; rerun to retry them.");
    }
    Ok(())
}
