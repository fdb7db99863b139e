//! Configuration module for TermBackup
//!
//! This module provides configuration management including:
//! - XDG-compliant path resolution
//! - Settings and profile persistence

pub mod paths;
pub mod settings;

pub use paths::TermBackupPaths;
pub use settings::{CryptoSettings, ProfileConfig, Settings};
