//! CLI command handlers
//!
//! This module bridges clap argument parsing with the service layer. Each
//! handler loads what it needs from a [`Context`] and prints results with the
//! display module.

pub mod audit;
pub mod backup;
pub mod daemon;
pub mod keys;
pub mod profile;

pub use audit::handle_audit_command;
pub use backup::{
    handle_backup, handle_compare, handle_list, handle_prune, handle_restore, handle_rotate_key,
    handle_verify,
};
pub use daemon::handle_daemon;
pub use keys::handle_keygen;
pub use profile::{handle_profile_command, ProfileCommands};

use std::sync::Arc;

use tracing::debug;

use crate::audit::{AuditLogger, AuditSink, NullAudit};
use crate::config::{ProfileConfig, Settings, TermBackupPaths};
use crate::credentials::{profile_password_key, CredentialStore, EnvCredentialStore};
use crate::crypto::Password;
use crate::error::{BackupError, BackupResult};
use crate::events::EventBus;
use crate::remote::{LocalStore, RetryingStore};
use crate::services::BackupRepository;

/// Paths, settings and credentials shared by every command
pub struct Context {
    pub paths: TermBackupPaths,
    pub settings: Settings,
    pub credentials: Box<dyn CredentialStore>,
}

impl Context {
    pub fn load() -> BackupResult<Self> {
        let paths = TermBackupPaths::new()?;
        let settings = Settings::load_or_create(&paths)?;
        Ok(Self {
            paths,
            settings,
            credentials: Box::new(EnvCredentialStore::new()),
        })
    }

    pub fn profile(&self, name: &str) -> BackupResult<&ProfileConfig> {
        self.settings.profile(name)
    }

    pub fn audit_sink(&self) -> Arc<dyn AuditSink> {
        if self.settings.audit_log_enabled {
            Arc::new(AuditLogger::new(self.paths.audit_log()))
        } else {
            Arc::new(NullAudit)
        }
    }

    /// Repository handle for `repo` over the configured local store
    pub fn repository(&self, repo: &str) -> BackupResult<BackupRepository> {
        self.paths.ensure_directories()?;

        let store = RetryingStore::new(
            LocalStore::new(self.settings.store_root(&self.paths)),
            self.settings.remote_retries,
        );

        let events = EventBus::new();
        events.subscribe("log", |event| {
            debug!(event = event.kind(), "Lifecycle event");
            Ok(())
        });

        Ok(BackupRepository::new(Arc::new(store), repo, self.paths.tmp_dir())
            .with_conflict_retries(self.settings.ledger_conflict_retries)
            .with_argon2_params(self.settings.crypto.argon2_params())
            .with_audit(self.audit_sink())
            .with_events(Arc::new(events)))
    }

    /// Stored password for `profile`, or an interactive prompt
    pub fn password(&self, profile: &str) -> BackupResult<Password> {
        if let Some(password) = self.credentials.get_password(&profile_password_key(profile))? {
            return Ok(password);
        }
        prompt_password(&format!("Password for profile '{}': ", profile))
    }
}

/// Read a password from the terminal without echo
pub fn prompt_password(prompt: &str) -> BackupResult<Password> {
    let value = rpassword::prompt_password(prompt)
        .map_err(|e| BackupError::Io(format!("Failed to read password: {}", e)))?;
    if value.is_empty() {
        return Err(BackupError::Validation("Password must not be empty".into()));
    }
    Ok(Password::new(value))
}

/// Prompt twice and require both entries to match
pub fn prompt_new_password(prompt: &str) -> BackupResult<Password> {
    let first = prompt_password(prompt)?;
    let second = prompt_password("Confirm password: ")?;
    if first.as_bytes() != second.as_bytes() {
        return Err(BackupError::Validation("Passwords do not match".into()));
    }
    Ok(first)
}
