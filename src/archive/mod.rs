//! The `.tbk` archive container
//!
//! An archive is a versioned header, the encrypted payload and, for
//! format 1, a trailing HMAC. The payload itself is a gzip-compressed tar.

pub mod codec;
pub mod header;
pub mod payload;

pub use codec::{open_archive, read_and_decrypt, read_header, write_archive, write_sealed};
pub use header::{ArchiveHeader, MAGIC_V1, MAGIC_V2};
pub use payload::{build_payload, ExtractStats, Payload, MANIFEST_MEMBER};

/// Blob name for a backup: `backup_<first 12 hex chars of id>.tbk`
pub fn archive_filename(backup_id: &str) -> String {
    let short: String = backup_id.chars().take(12).collect();
    format!("backup_{}.tbk", short)
}
