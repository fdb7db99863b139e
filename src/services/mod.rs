//! Service layer for TermBackup
//!
//! Each service borrows a [`BackupRepository`] and implements one operation
//! on top of the archive, manifest, ledger and remote layers.

pub mod backup;
pub mod compare;
pub mod prune;
pub mod repository;
pub mod restore;
pub mod rotate;
pub mod verify;

pub use backup::{BackupOutcome, BackupService, BackupSummary};
pub use compare::{CompareService, Comparison};
pub use prune::{PruneReport, PruneService};
pub use repository::{BackupRepository, FetchedArchive};
pub use restore::{RestoreOptions, RestoreReport, RestoreService};
pub use rotate::{KeyRotator, RotationReport};
pub use verify::{Check, VerifyReport, VerifyService};
