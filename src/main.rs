use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use termbackup::cli::{self, Context, ProfileCommands};
use termbackup::services::RestoreOptions;

#[derive(Parser)]
#[command(
    name = "termbackup",
    version,
    about = "Encrypted, versioned, incremental backups",
    long_about = "TermBackup scans a directory into a content-addressed manifest, \
                  packs it into a password-encrypted archive and records every \
                  backup in a ledger stored next to the archives."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the configuration directory and default settings
    Init,

    /// Show resolved paths and settings
    Config,

    /// Profile management commands
    #[command(subcommand)]
    Profile(ProfileCommands),

    /// Back up a profile
    Backup {
        profile: String,
        /// Build and encrypt the archive without uploading it
        #[arg(long)]
        dry_run: bool,
    },

    /// List the backups of a profile
    #[command(alias = "ls")]
    List { profile: String },

    /// Restore a backup (id or unique prefix)
    Restore {
        profile: String,
        backup_id: String,
        /// Destination directory
        #[arg(short, long)]
        dest: PathBuf,
        /// List the files that would be restored
        #[arg(long)]
        dry_run: bool,
        /// Replace files that already exist at the destination
        #[arg(long)]
        overwrite: bool,
    },

    /// Run the verification checklist on a backup
    Verify { profile: String, backup_id: String },

    /// Show what changed between two backups
    Compare {
        profile: String,
        older: String,
        newer: String,
    },

    /// Apply the profile's retention policy
    Prune {
        profile: String,
        /// Show what would be pruned
        #[arg(long)]
        dry_run: bool,
    },

    /// Re-encrypt every backup of a profile under a new password
    RotateKey { profile: String },

    /// Back up a profile repeatedly until interrupted
    Daemon {
        profile: String,
        /// Seconds between runs
        #[arg(short, long, default_value = "3600")]
        interval: u64,
    },

    /// Generate the archive signing key
    Keygen {
        /// Profile whose password locks the key
        profile: String,
        #[arg(short, long)]
        force: bool,
    },

    /// Show recent audit log entries
    Audit {
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut ctx = Context::load()?;
    termbackup::logging::init(&ctx.settings.log_level)?;

    match cli.command {
        Some(Commands::Init) => {
            println!("Initializing TermBackup at: {}", ctx.paths.base_dir().display());
            ctx.paths.ensure_directories()?;
            ctx.settings.save(&ctx.paths)?;
            println!("Initialization complete!");
            println!();
            println!("Add a profile with:");
            println!("  termbackup profile add <name> --source <dir> --repo <owner/name>");
        }
        Some(Commands::Config) => {
            println!("TermBackup Configuration");
            println!("========================");
            println!("Base directory: {}", ctx.paths.base_dir().display());
            println!("Store root:     {}", ctx.settings.store_root(&ctx.paths).display());
            println!("Audit log:      {}", ctx.paths.audit_log().display());
            println!();
            println!("Settings:");
            println!("  Audit log enabled: {}", ctx.settings.audit_log_enabled);
            println!("  Remote retries:    {}", ctx.settings.remote_retries);
            println!("  Profiles:          {}", ctx.settings.profiles.len());
        }
        Some(Commands::Profile(cmd)) => cli::handle_profile_command(&mut ctx, cmd)?,
        Some(Commands::Backup { profile, dry_run }) => cli::handle_backup(&ctx, &profile, dry_run)?,
        Some(Commands::List { profile }) => cli::handle_list(&ctx, &profile)?,
        Some(Commands::Restore {
            profile,
            backup_id,
            dest,
            dry_run,
            overwrite,
        }) => cli::handle_restore(
            &ctx,
            &profile,
            &backup_id,
            &dest,
            RestoreOptions { dry_run, overwrite },
        )?,
        Some(Commands::Verify { profile, backup_id }) => cli::handle_verify(&ctx, &profile, &backup_id)?,
        Some(Commands::Compare { profile, older, newer }) => {
            cli::handle_compare(&ctx, &profile, &older, &newer)?
        }
        Some(Commands::Prune { profile, dry_run }) => cli::handle_prune(&ctx, &profile, dry_run)?,
        Some(Commands::RotateKey { profile }) => cli::handle_rotate_key(&ctx, &profile)?,
        Some(Commands::Daemon { profile, interval }) => cli::handle_daemon(&ctx, &profile, interval)?,
        Some(Commands::Keygen { profile, force }) => cli::handle_keygen(&ctx, &profile, force)?,
        Some(Commands::Audit { limit }) => cli::handle_audit_command(&ctx, limit)?,
        None => {
            println!("TermBackup - encrypted, versioned, incremental backups");
            println!();
            println!("Run 'termbackup --help' for usage information.");
        }
    }

    Ok(())
}
