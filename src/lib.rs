//! TermBackup - encrypted, versioned, incremental backups
//!
//! This library implements the backup engine behind the `termbackup` binary.
//! A source tree is scanned into a content-addressed manifest, packed into a
//! gzip tar payload and sealed into a password-encrypted `.tbk` archive. The
//! archive is uploaded as a blob to a remote store, and a JSON ledger kept in
//! the same repository records every backup.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `crypto`: key derivation, authenticated encryption, zeroizing passwords
//! - `archive`: `.tbk` framing and the compressed tar payload
//! - `manifest`: source tree scanning, exclusion and content addressing
//! - `diff`: manifest comparison
//! - `ledger`: the remote backup index with optimistic concurrency
//! - `remote`: the remote store interface and a directory-backed store
//! - `retention`: selection of backups to prune
//! - `chain`: incremental chain resolution and materialization
//! - `services`: backup, restore, verify, prune, compare and key rotation
//! - `audit`, `events`, `signing`, `credentials`: collaborators used by services
//! - `daemon`: repeated backups with cooperative shutdown
//! - `config`, `cli`, `display`: the command-line front end
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use termbackup::config::ProfileConfig;
//! use termbackup::crypto::Password;
//! use termbackup::remote::LocalStore;
//! use termbackup::services::{BackupRepository, BackupService};
//!
//! let store = Arc::new(LocalStore::new("/srv/backups"));
//! let repo = BackupRepository::new(store, "alice/docs", "/tmp/termbackup");
//! let profile = ProfileConfig::new("docs", "/home/alice/docs", "alice/docs");
//! BackupService::new(&repo).run(&profile, &Password::new("secret"), false)?;
//! ```

pub mod archive;
pub mod audit;
pub mod chain;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod crypto;
pub mod daemon;
pub mod diff;
pub mod display;
pub mod error;
pub mod events;
pub mod file_io;
pub mod ledger;
pub mod logging;
pub mod manifest;
pub mod remote;
pub mod retention;
pub mod services;
pub mod signing;

pub use error::{BackupError, BackupResult};
