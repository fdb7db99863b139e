//! Custom error types for TermBackup
//!
//! This module defines the error taxonomy for the backup engine using thiserror.
//! Cryptographic, format and integrity failures are kept distinct so callers
//! can react to each (e.g. map an authentication failure to "wrong password or
//! corrupted archive").

use thiserror::Error;

use crate::remote::RemoteErrorKind;

/// The main error type for TermBackup operations
#[derive(Error, Debug)]
pub enum BackupError {
    /// Archive framing errors (bad magic, unsupported version byte, truncated header)
    #[error("Format error: {0}")]
    Format(String),

    /// Recognized magic but a version byte this build cannot read
    #[error("Unsupported archive version {version} under magic {magic}")]
    UnsupportedVersion { magic: String, version: u8 },

    /// MAC or AEAD tag verification failed.
    ///
    /// A wrong password and a tampered archive are indistinguishable here.
    #[error("Authentication failed: {0} (wrong password or corrupted archive)")]
    Authentication(String),

    /// Content hash or manifest id mismatch
    #[error("Integrity check failed: {0}")]
    Integrity(String),

    /// Failure reported by the remote store collaborator
    #[error("Remote store error ({kind}): {message}")]
    Remote {
        kind: RemoteErrorKind,
        message: String,
    },

    /// The ledger changed between fetch and write
    #[error("Ledger conflict: {0}")]
    Conflict(String),

    /// Entity not found errors
    #[error("{entity_type} not found: {identifier}")]
    NotFound {
        entity_type: &'static str,
        identifier: String,
    },

    /// A backup id prefix matched more than one ledger entry
    #[error("Backup id '{prefix}' is ambiguous ({matches} matches)")]
    AmbiguousId { prefix: String, matches: usize },

    /// Payload decompression or tar errors
    #[error("Archive error: {0}")]
    Archive(String),

    /// Key derivation or cipher setup errors
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation errors for profiles and inputs
    #[error("Validation error: {0}")]
    Validation(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),
}

impl BackupError {
    /// Create a "not found" error for ledger entries
    pub fn backup_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Backup",
            identifier: identifier.into(),
        }
    }

    /// Create a "not found" error for profiles
    pub fn profile_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Profile",
            identifier: identifier.into(),
        }
    }

    /// Create a remote error of the given kind
    pub fn remote(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self::Remote {
            kind,
            message: message.into(),
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
            || matches!(
                self,
                Self::Remote {
                    kind: RemoteErrorKind::NotFound,
                    ..
                }
            )
    }

    /// Check if this is a ledger version conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Check if this is an authentication (MAC/tag) failure
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }

    /// Check if the transport may succeed on a retry
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Remote { kind, .. } => kind.is_transient(),
            _ => false,
        }
    }
}

impl From<std::io::Error> for BackupError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for BackupError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Result type alias for TermBackup operations
pub type BackupResult<T> = Result<T, BackupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BackupError::Format("bad magic".into());
        assert_eq!(err.to_string(), "Format error: bad magic");
    }

    #[test]
    fn test_unsupported_version_display() {
        let err = BackupError::UnsupportedVersion {
            magic: "TBK2".into(),
            version: 9,
        };
        assert_eq!(err.to_string(), "Unsupported archive version 9 under magic TBK2");
    }

    #[test]
    fn test_not_found_error() {
        let err = BackupError::backup_not_found("abc123");
        assert_eq!(err.to_string(), "Backup not found: abc123");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_remote_not_found_counts_as_not_found() {
        let err = BackupError::remote(RemoteErrorKind::NotFound, "blob missing");
        assert!(err.is_not_found());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_transient_classification() {
        assert!(BackupError::remote(RemoteErrorKind::Network, "reset").is_transient());
        assert!(BackupError::remote(RemoteErrorKind::RateLimited, "slow down").is_transient());
        assert!(!BackupError::Conflict("stale token".into()).is_transient());
    }

    #[test]
    fn test_ambiguous_id_display() {
        let err = BackupError::AmbiguousId {
            prefix: "ab".into(),
            matches: 2,
        };
        assert_eq!(err.to_string(), "Backup id 'ab' is ambiguous (2 matches)");
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: BackupError = io_err.into();
        assert!(matches!(err, BackupError::Io(_)));
    }
}
