//! Profile CLI commands

use clap::Subcommand;

use super::Context;
use crate::config::ProfileConfig;
use crate::error::BackupResult;
use crate::manifest::BackupMode;

/// Profile subcommands
#[derive(Subcommand)]
pub enum ProfileCommands {
    /// Add a backup profile
    Add {
        /// Profile name (letters, digits, '-' and '_')
        name: String,

        /// Directory to back up
        #[arg(short, long)]
        source: String,

        /// Target repository as owner/name
        #[arg(short, long)]
        repo: String,

        /// Extra exclude pattern (repeatable)
        #[arg(short, long = "exclude")]
        excludes: Vec<String>,

        /// Backup mode: full or incremental
        #[arg(short, long, default_value = "full")]
        mode: BackupMode,

        /// Gzip level 0-9
        #[arg(long, default_value = "6")]
        compression_level: u32,

        /// Keep at most this many backups
        #[arg(long)]
        max_backups: Option<i64>,

        /// Prune backups older than this many days
        #[arg(long)]
        retention_days: Option<i64>,
    },

    /// List configured profiles
    List,

    /// Remove a profile (stored backups are kept)
    Remove {
        name: String,
    },
}

/// Handle a profile command
pub fn handle_profile_command(ctx: &mut Context, cmd: ProfileCommands) -> BackupResult<()> {
    match cmd {
        ProfileCommands::Add {
            name,
            source,
            repo,
            excludes,
            mode,
            compression_level,
            max_backups,
            retention_days,
        } => {
            let source_dir = std::fs::canonicalize(&source)
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or(source);
            let profile = ProfileConfig {
                excludes,
                backup_mode: mode,
                compression_level,
                max_backups,
                retention_days,
                ..ProfileConfig::new(name, source_dir, repo)
            };
            let name = profile.name.clone();
            ctx.settings.add_profile(profile)?;
            ctx.settings.save(&ctx.paths)?;
            println!("Added profile '{}'", name);
        }

        ProfileCommands::List => {
            let profiles: Vec<&ProfileConfig> = ctx.settings.profiles.values().collect();
            if profiles.is_empty() {
                println!("No profiles found.");
                println!("Create one with: termbackup profile add <name> --source <dir> --repo <owner/name>");
                return Ok(());
            }

            let name_width = profiles.iter().map(|p| p.name.len()).max().unwrap_or(4).max(4);
            let repo_width = profiles.iter().map(|p| p.repo.len()).max().unwrap_or(4).max(4);

            println!(
                "{:<name_width$}  {:<repo_width$}  {:<11}  {}",
                "Name",
                "Repo",
                "Mode",
                "Source",
                name_width = name_width,
                repo_width = repo_width,
            );
            println!(
                "{:-<name_width$}  {:-<repo_width$}  {:-<11}  {:-<6}",
                "",
                "",
                "",
                "",
                name_width = name_width,
                repo_width = repo_width,
            );
            for profile in profiles {
                println!(
                    "{:<name_width$}  {:<repo_width$}  {:<11}  {}",
                    profile.name,
                    profile.repo,
                    profile.backup_mode.to_string(),
                    profile.source_dir,
                    name_width = name_width,
                    repo_width = repo_width,
                );
            }
        }

        ProfileCommands::Remove { name } => {
            let removed = ctx.settings.remove_profile(&name)?;
            ctx.settings.save(&ctx.paths)?;
            println!("Removed profile '{}'", removed.name);
            println!("Backups in {} were not touched.", removed.repo);
        }
    }

    Ok(())
}
