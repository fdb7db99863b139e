//! User settings for TermBackup
//!
//! Manages global preferences, crypto cost parameters and backup profiles.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::paths::TermBackupPaths;
use crate::crypto::{Argon2Params, MAX_ARGON2_MEMORY_KIB, MAX_ARGON2_TIME_COST};
use crate::error::{BackupError, BackupResult};
use crate::file_io::{read_json, write_json_atomic};
use crate::manifest::BackupMode;
use crate::retention::RetentionPolicy;

/// Argon2id cost parameters used for new archives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptoSettings {
    /// Memory cost in KiB
    #[serde(default = "default_memory_kib")]
    pub argon2_memory_kib: u32,
    #[serde(default = "default_time_cost")]
    pub argon2_time_cost: u16,
    #[serde(default = "default_parallelism")]
    pub argon2_parallelism: u8,
}

fn default_memory_kib() -> u32 {
    65536
}

fn default_time_cost() -> u16 {
    3
}

fn default_parallelism() -> u8 {
    4
}

impl Default for CryptoSettings {
    fn default() -> Self {
        Self {
            argon2_memory_kib: default_memory_kib(),
            argon2_time_cost: default_time_cost(),
            argon2_parallelism: default_parallelism(),
        }
    }
}

impl CryptoSettings {
    /// Configured costs, capped to what archive headers accept on read
    pub fn argon2_params(&self) -> Argon2Params {
        Argon2Params::new(
            self.argon2_memory_kib.min(MAX_ARGON2_MEMORY_KIB),
            self.argon2_time_cost.min(MAX_ARGON2_TIME_COST),
            self.argon2_parallelism,
        )
    }
}

/// A named backup profile: what to back up and where
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub name: String,
    pub source_dir: String,
    /// Repository in `owner/name` form
    pub repo: String,
    #[serde(default)]
    pub excludes: Vec<String>,
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,
    #[serde(default)]
    pub max_backups: Option<i64>,
    #[serde(default)]
    pub retention_days: Option<i64>,
    #[serde(default)]
    pub backup_mode: BackupMode,
    /// Stored for compatibility; notifications are not sent
    #[serde(default)]
    pub webhook_url: Option<String>,
}

fn default_compression_level() -> u32 {
    6
}

impl ProfileConfig {
    /// A full-mode profile with default compression and no retention
    pub fn new(name: impl Into<String>, source_dir: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_dir: source_dir.into(),
            repo: repo.into(),
            excludes: Vec::new(),
            compression_level: default_compression_level(),
            max_backups: None,
            retention_days: None,
            backup_mode: BackupMode::Full,
            webhook_url: None,
        }
    }

    /// Check name, repository and compression level
    pub fn validate(&self) -> BackupResult<()> {
        let name_ok = !self.name.is_empty()
            && self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !name_ok {
            return Err(BackupError::Validation(format!(
                "Profile name '{}' must contain only alphanumeric characters, hyphens, and underscores",
                self.name
            )));
        }

        let repo_part = |s: &str| {
            !s.is_empty()
                && s != "."
                && s != ".."
                && s
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        };
        let repo_ok = match self.repo.split_once('/') {
            Some((owner, name)) => repo_part(owner) && repo_part(name),
            None => false,
        };
        if !repo_ok {
            return Err(BackupError::Validation(format!(
                "Repository '{}' must be in 'owner/repo' format",
                self.repo
            )));
        }

        if self.compression_level > 9 {
            return Err(BackupError::Validation(format!(
                "Compression level {} is out of range 0-9",
                self.compression_level
            )));
        }

        Ok(())
    }

    pub fn source_path(&self) -> PathBuf {
        PathBuf::from(&self.source_dir)
    }

    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy::new(self.max_backups, self.retention_days)
    }
}

/// User settings for TermBackup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Schema version for migration support
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Root directory of the local store (defaults to `<base>/store`)
    #[serde(default)]
    pub store_root: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub audit_log_enabled: bool,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Hashing threads; 0 picks `min(8, cores)`
    #[serde(default)]
    pub hash_workers: usize,

    /// Retries for transient remote failures
    #[serde(default = "default_remote_retries")]
    pub remote_retries: u32,

    /// Re-applies of a ledger mutation after a version conflict
    #[serde(default)]
    pub ledger_conflict_retries: u32,

    #[serde(default)]
    pub crypto: CryptoSettings,

    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileConfig>,
}

fn default_schema_version() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_remote_retries() -> u32 {
    3
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            store_root: None,
            audit_log_enabled: true,
            log_level: default_log_level(),
            hash_workers: 0,
            remote_retries: default_remote_retries(),
            ledger_conflict_retries: 0,
            crypto: CryptoSettings::default(),
            profiles: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Load settings from disk, or defaults if the file doesn't exist
    pub fn load_or_create(paths: &TermBackupPaths) -> BackupResult<Self> {
        read_json(paths.settings_file())
            .map_err(|e| BackupError::Config(format!("Failed to load settings: {}", e)))
    }

    /// Save settings atomically
    pub fn save(&self, paths: &TermBackupPaths) -> BackupResult<()> {
        paths.ensure_directories()?;
        write_json_atomic(paths.settings_file(), self)
    }

    /// Effective local store root
    pub fn store_root(&self, paths: &TermBackupPaths) -> PathBuf {
        self.store_root.clone().unwrap_or_else(|| paths.store_dir())
    }

    pub fn profile(&self, name: &str) -> BackupResult<&ProfileConfig> {
        self.profiles
            .get(name)
            .ok_or_else(|| BackupError::profile_not_found(name))
    }

    /// Validate and add a new profile
    pub fn add_profile(&mut self, profile: ProfileConfig) -> BackupResult<()> {
        profile.validate()?;
        if self.profiles.contains_key(&profile.name) {
            return Err(BackupError::Validation(format!(
                "Profile '{}' already exists",
                profile.name
            )));
        }
        self.profiles.insert(profile.name.clone(), profile);
        Ok(())
    }

    pub fn remove_profile(&mut self, name: &str) -> BackupResult<ProfileConfig> {
        self.profiles
            .remove(name)
            .ok_or_else(|| BackupError::profile_not_found(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn profile() -> ProfileConfig {
        ProfileConfig::new("docs", "/home/alice/docs", "alice/backups")
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.remote_retries, 3);
        assert_eq!(settings.ledger_conflict_retries, 0);
        assert_eq!(settings.crypto.argon2_params(), Argon2Params::default());
        assert!(settings.audit_log_enabled);
    }

    #[test]
    fn test_argon2_costs_capped() {
        let crypto = CryptoSettings {
            argon2_memory_kib: u32::MAX,
            argon2_time_cost: 1000,
            argon2_parallelism: 2,
        };
        assert_eq!(
            crypto.argon2_params(),
            Argon2Params::new(MAX_ARGON2_MEMORY_KIB, MAX_ARGON2_TIME_COST, 2)
        );
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let paths = TermBackupPaths::with_base_dir(temp_dir.path().to_path_buf());

        let mut settings = Settings::default();
        settings.add_profile(profile()).unwrap();
        settings.hash_workers = 2;
        settings.save(&paths).unwrap();

        let loaded = Settings::load_or_create(&paths).unwrap();
        assert_eq!(loaded.hash_workers, 2);
        assert_eq!(loaded.profile("docs").unwrap(), &profile());
    }

    #[test]
    fn test_sparse_file_gets_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let paths = TermBackupPaths::with_base_dir(temp_dir.path().to_path_buf());
        std::fs::write(paths.settings_file(), r#"{"log_level":"debug"}"#).unwrap();

        let loaded = Settings::load_or_create(&paths).unwrap();
        assert_eq!(loaded.log_level, "debug");
        assert_eq!(loaded.remote_retries, 3);
        assert_eq!(loaded.crypto.argon2_memory_kib, 65536);
    }

    #[test]
    fn test_profile_validation() {
        assert!(profile().validate().is_ok());

        let mut bad_name = profile();
        bad_name.name = "my docs!".into();
        assert!(bad_name.validate().is_err());

        let mut bad_repo = profile();
        bad_repo.repo = "no-slash".into();
        assert!(bad_repo.validate().is_err());
        bad_repo.repo = "a/b/c".into();
        assert!(bad_repo.validate().is_err());
        bad_repo.repo = "../x".into();
        assert!(bad_repo.validate().is_err());

        let mut bad_level = profile();
        bad_level.compression_level = 10;
        assert!(bad_level.validate().is_err());
    }

    #[test]
    fn test_duplicate_and_missing_profiles() {
        let mut settings = Settings::default();
        settings.add_profile(profile()).unwrap();
        assert!(settings.add_profile(profile()).is_err());

        settings.remove_profile("docs").unwrap();
        assert!(settings.profile("docs").unwrap_err().is_not_found());
        assert!(settings.remove_profile("docs").is_err());
    }

    #[test]
    fn test_profile_defaults_from_json() {
        let raw = r#"{"name":"p","source_dir":"/src","repo":"a/b"}"#;
        let p: ProfileConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(p.compression_level, 6);
        assert_eq!(p.backup_mode, BackupMode::Full);
        assert!(!p.retention().is_enabled());
    }
}
