//! Remote store collaborator
//!
//! The engine talks to remote storage only through [`RemoteStore`]: one
//! versioned metadata document per repository (the ledger) plus named blobs.
//! Writes to the document carry the version token from the last read;
//! a stale token is rejected with [`BackupError::Conflict`].

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::BackupResult;

pub mod local;
pub mod retry;

pub use local::LocalStore;
pub use retry::RetryingStore;

/// Category of a remote failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorKind {
    Auth,
    PermissionDenied,
    NotFound,
    RateLimited,
    Validation,
    Network,
    Server,
    Other,
}

impl RemoteErrorKind {
    /// Classify an HTTP-like status code
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => Self::Auth,
            403 => Self::PermissionDenied,
            404 => Self::NotFound,
            408 => Self::Network,
            422 => Self::Validation,
            429 => Self::RateLimited,
            500..=599 => Self::Server,
            _ => Self::Other,
        }
    }

    /// Whether retrying the same request may succeed
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Network | Self::RateLimited | Self::Server)
    }
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Auth => "authentication",
            Self::PermissionDenied => "permission denied",
            Self::NotFound => "not found",
            Self::RateLimited => "rate limited",
            Self::Validation => "validation",
            Self::Network => "network",
            Self::Server => "server",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

/// Opaque token identifying the version of a metadata document
pub type VersionToken = String;

/// Identifier returned by a successful write
pub type CommitId = String;

/// A fetched metadata document and the token needed to overwrite it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub content: Option<String>,
    pub version_token: Option<VersionToken>,
}

/// Object + metadata storage with optimistic concurrency
pub trait RemoteStore: Send + Sync {
    /// Fetch the repository's metadata document, if any
    fn get_metadata(&self, repo: &str) -> BackupResult<Metadata>;

    /// Write the metadata document; `version_token` must match the current
    /// document (or be `None` when there is none). Returns a commit id.
    fn put_metadata(
        &self,
        repo: &str,
        content: &str,
        version_token: Option<&str>,
    ) -> BackupResult<CommitId>;

    /// Upload a file as a blob named after its file name. Returns a commit id.
    fn upload_blob(&self, repo: &str, local_path: &Path) -> BackupResult<CommitId>;

    fn download_blob(&self, repo: &str, name: &str, dest_path: &Path) -> BackupResult<()>;

    fn delete_blob(&self, repo: &str, name: &str) -> BackupResult<()>;
}

impl<S: RemoteStore + ?Sized> RemoteStore for Box<S> {
    fn get_metadata(&self, repo: &str) -> BackupResult<Metadata> {
        (**self).get_metadata(repo)
    }

    fn put_metadata(
        &self,
        repo: &str,
        content: &str,
        version_token: Option<&str>,
    ) -> BackupResult<CommitId> {
        (**self).put_metadata(repo, content, version_token)
    }

    fn upload_blob(&self, repo: &str, local_path: &Path) -> BackupResult<CommitId> {
        (**self).upload_blob(repo, local_path)
    }

    fn download_blob(&self, repo: &str, name: &str, dest_path: &Path) -> BackupResult<()> {
        (**self).download_blob(repo, name, dest_path)
    }

    fn delete_blob(&self, repo: &str, name: &str) -> BackupResult<()> {
        (**self).delete_blob(repo, name)
    }
}
