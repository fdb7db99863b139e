//! Path management for TermBackup
//!
//! ## Path Resolution Order
//!
//! 1. `TERMBACKUP_HOME` environment variable (if set)
//! 2. Unix (Linux/macOS): `$XDG_CONFIG_HOME/termbackup` or `~/.config/termbackup`
//! 3. Windows: `%APPDATA%\termbackup`

use std::path::PathBuf;

use crate::error::{BackupError, BackupResult};

/// Manages all local paths used by TermBackup
#[derive(Debug, Clone)]
pub struct TermBackupPaths {
    /// Base directory for all TermBackup data
    base_dir: PathBuf,
}

impl TermBackupPaths {
    /// Resolve the base directory from the environment
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn new() -> BackupResult<Self> {
        let base_dir = match std::env::var("TERMBACKUP_HOME") {
            Ok(custom) if !custom.is_empty() => PathBuf::from(custom),
            _ => resolve_default_path()?,
        };

        Ok(Self { base_dir })
    }

    /// Create TermBackupPaths with a custom base directory (useful for testing)
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the path to the settings file
    pub fn settings_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the path to the audit log
    pub fn audit_log(&self) -> PathBuf {
        self.base_dir.join("audit.log")
    }

    /// Scratch space for archives being built, downloaded or re-encrypted
    pub fn tmp_dir(&self) -> PathBuf {
        self.base_dir.join("tmp")
    }

    /// Default root of the local remote store
    pub fn store_dir(&self) -> PathBuf {
        self.base_dir.join("store")
    }

    /// Password-encrypted Ed25519 signing key
    pub fn signing_key(&self) -> PathBuf {
        self.base_dir.join("signing_key.tbk")
    }

    /// Hex-encoded Ed25519 public key
    pub fn signing_pub(&self) -> PathBuf {
        self.base_dir.join("signing_key.pub")
    }

    /// Ensure the base and scratch directories exist
    pub fn ensure_directories(&self) -> BackupResult<()> {
        std::fs::create_dir_all(&self.base_dir)
            .map_err(|e| BackupError::Io(format!("Failed to create base directory: {}", e)))?;

        std::fs::create_dir_all(self.tmp_dir())
            .map_err(|e| BackupError::Io(format!("Failed to create tmp directory: {}", e)))?;

        Ok(())
    }

    /// Check if TermBackup has been initialized (config file exists)
    pub fn is_initialized(&self) -> bool {
        self.settings_file().exists()
    }
}

/// Resolve the default data directory path based on platform
#[cfg(not(windows))]
fn resolve_default_path() -> BackupResult<PathBuf> {
    let config_base = match std::env::var("XDG_CONFIG_HOME") {
        Ok(xdg) if !xdg.is_empty() => PathBuf::from(xdg),
        _ => {
            let home = std::env::var("HOME").map_err(|_| {
                BackupError::Config("HOME environment variable not set".into())
            })?;
            PathBuf::from(home).join(".config")
        }
    };
    Ok(config_base.join("termbackup"))
}

/// Resolve the default data directory path based on platform
#[cfg(windows)]
fn resolve_default_path() -> BackupResult<PathBuf> {
    let appdata = std::env::var("APPDATA")
        .map_err(|_| BackupError::Config("Could not determine APPDATA directory".into()))?;
    Ok(PathBuf::from(appdata).join("termbackup"))
}
