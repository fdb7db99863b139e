//! Directory-backed remote store
//!
//! Layout: `<root>/<owner>/<name>/metadata.json` and
//! `<root>/<owner>/<name>/blobs/<blob>`. The version token of the metadata
//! document is the SHA-256 of its content.
//!
//! Metadata writes hold an exclusive advisory lock on
//! `<root>/<owner>/<name>/metadata.lock` from the token check until the new
//! document is renamed into place, so separate processes sharing a store
//! see each other's writes as conflicts.

use std::fs::{self, OpenOptions};
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use super::{Metadata, RemoteErrorKind, RemoteStore};
use crate::error::{BackupError, BackupResult};
use crate::file_io::{sha256_hex, write_bytes_atomic};

const METADATA_FILE: &str = "metadata.json";
const LOCK_FILE: &str = "metadata.lock";
const BLOB_DIR: &str = "blobs";

/// A [`RemoteStore`] living in a local (or mounted) directory
#[derive(Debug)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn repo_dir(&self, repo: &str) -> BackupResult<PathBuf> {
        let relative = Path::new(repo);
        let clean = !repo.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !clean {
            return Err(BackupError::remote(
                RemoteErrorKind::Validation,
                format!("Invalid repository name '{}'", repo),
            ));
        }
        Ok(self.root.join(relative))
    }

    fn blob_path(&self, repo: &str, name: &str) -> BackupResult<PathBuf> {
        let valid = !name.is_empty()
            && !name.contains('/')
            && !name.contains('\\')
            && name != "."
            && name != "..";
        if !valid {
            return Err(BackupError::remote(
                RemoteErrorKind::Validation,
                format!("Invalid blob name '{}'", name),
            ));
        }
        Ok(self.repo_dir(repo)?.join(BLOB_DIR).join(name))
    }

    /// Names of all blobs in a repository
    pub fn list_blobs(&self, repo: &str) -> BackupResult<Vec<String>> {
        let dir = self.repo_dir(repo)?.join(BLOB_DIR);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&dir)
            .map_err(|e| BackupError::Io(format!("Failed to list {}: {}", dir.display(), e)))?
        {
            let entry = entry.map_err(|e| BackupError::Io(e.to_string()))?;
            if let Some(name) = entry.file_name().to_str() {
                if !name.ends_with(".tmp") {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

fn commit_id(kind: &str, name: &str, content_hash: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let mut id = sha256_hex(format!("{}:{}:{}:{}", kind, name, content_hash, nanos).as_bytes());
    id.truncate(40);
    id
}

fn not_found(what: impl Into<String>) -> BackupError {
    BackupError::remote(RemoteErrorKind::NotFound, what)
}

impl RemoteStore for LocalStore {
    fn get_metadata(&self, repo: &str) -> BackupResult<Metadata> {
        let path = self.repo_dir(repo)?.join(METADATA_FILE);
        if !path.exists() {
            return Ok(Metadata::default());
        }
        let content = fs::read_to_string(&path)
            .map_err(|e| BackupError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
        let token = sha256_hex(content.as_bytes());
        Ok(Metadata {
            content: Some(content),
            version_token: Some(token),
        })
    }

    fn put_metadata(
        &self,
        repo: &str,
        content: &str,
        version_token: Option<&str>,
    ) -> BackupResult<String> {
        let dir = self.repo_dir(repo)?;
        let path = dir.join(METADATA_FILE);
        fs::create_dir_all(&dir)
            .map_err(|e| BackupError::Io(format!("Failed to create {}: {}", dir.display(), e)))?;

        let lock_path = dir.join(LOCK_FILE);
        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| BackupError::Io(format!("Failed to open {}: {}", lock_path.display(), e)))?;
        let mut lock = fd_lock::RwLock::new(lock_file);
        let _guard = lock.write().map_err(|e| {
            BackupError::Io(format!("Failed to lock {}: {}", lock_path.display(), e))
        })?;

        let current = if path.exists() {
            let existing = fs::read(&path).map_err(|e| {
                BackupError::Io(format!("Failed to read {}: {}", path.display(), e))
            })?;
            Some(sha256_hex(&existing))
        } else {
            None
        };

        match (current.as_deref(), version_token) {
            (None, None) => {}
            (Some(current), Some(expected)) if current == expected => {}
            (Some(_), None) => {
                return Err(BackupError::Conflict(format!(
                    "Metadata for {} was created concurrently",
                    repo
                )))
            }
            (None, Some(_)) => {
                return Err(BackupError::Conflict(format!(
                    "Metadata for {} was removed concurrently",
                    repo
                )))
            }
            (Some(_), Some(_)) => {
                return Err(BackupError::Conflict(format!(
                    "Metadata for {} changed since it was read",
                    repo
                )))
            }
        }

        write_bytes_atomic(&path, content.as_bytes())?;
        let hash = sha256_hex(content.as_bytes());
        debug!(repo, "Metadata written");
        Ok(commit_id("metadata", METADATA_FILE, &hash))
    }

    fn upload_blob(&self, repo: &str, local_path: &Path) -> BackupResult<String> {
        let name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                BackupError::Validation(format!("Invalid blob path {}", local_path.display()))
            })?;
        let dest = self.blob_path(repo, name)?;
        let data = fs::read(local_path).map_err(|e| {
            BackupError::Io(format!("Failed to read {}: {}", local_path.display(), e))
        })?;
        write_bytes_atomic(&dest, &data)?;
        debug!(repo, blob = name, bytes = data.len(), "Blob uploaded");
        Ok(commit_id("blob", name, &sha256_hex(&data)))
    }

    fn download_blob(&self, repo: &str, name: &str, dest_path: &Path) -> BackupResult<()> {
        let src = self.blob_path(repo, name)?;
        if !src.exists() {
            return Err(not_found(format!("Blob {} not found in {}", name, repo)));
        }
        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&src, dest_path).map_err(|e| {
            BackupError::Io(format!("Failed to download {}: {}", name, e))
        })?;
        Ok(())
    }

    fn delete_blob(&self, repo: &str, name: &str) -> BackupResult<()> {
        let path = self.blob_path(repo, name)?;
        if !path.exists() {
            return Err(not_found(format!("Blob {} not found in {}", name, repo)));
        }
        fs::remove_file(&path)
            .map_err(|e| BackupError::Io(format!("Failed to delete {}: {}", name, e)))
    }
}
