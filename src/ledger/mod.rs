//! The backup ledger: the single source of truth for which backups exist

pub mod model;
pub mod store;

pub use model::{LedgerDocument, LedgerEntry, TOOL_VERSION};
pub use store::{BlobUpdate, Ledger};
