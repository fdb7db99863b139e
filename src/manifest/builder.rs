//! Source-tree scanning and parallel hashing

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use rayon::prelude::*;
use tracing::{debug, info, info_span, warn};
use walkdir::WalkDir;

use super::exclude::ExcludeMatcher;
use super::model::{BackupMode, FileRecord, Manifest};
use crate::archive::MANIFEST_MEMBER;
use crate::error::{BackupError, BackupResult};
use crate::file_io::sha256_file;

/// Upper bound on hashing threads
pub const MAX_HASH_WORKERS: usize = 8;

/// `min(8, available cores)`
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .min(MAX_HASH_WORKERS)
}

/// Builds sealed manifests from a source directory
#[derive(Debug, Clone)]
pub struct ManifestBuilder {
    excludes: Vec<String>,
    workers: usize,
}

impl ManifestBuilder {
    /// Create a builder; the pattern list is copied, never modified
    pub fn new(excludes: &[String]) -> Self {
        Self {
            excludes: excludes.to_vec(),
            workers: default_workers(),
        }
    }

    /// Override the hashing pool size (0 = default)
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = if workers == 0 {
            default_workers()
        } else {
            workers
        };
        self
    }

    /// Scan `source_root` and produce a sealed manifest
    pub fn build(
        &self,
        source_root: &Path,
        mode: BackupMode,
        parent_backup_id: Option<String>,
    ) -> BackupResult<Manifest> {
        let files = self.scan(source_root)?;
        Manifest::new(mode, files, parent_backup_id).seal()
    }

    /// Walk, filter and hash every regular file under `source_root`
    pub fn scan(&self, source_root: &Path) -> BackupResult<Vec<FileRecord>> {
        let span = info_span!("scan", root = %source_root.display());
        let _guard = span.enter();

        if !source_root.is_dir() {
            return Err(BackupError::Validation(format!(
                "Source directory does not exist: {}",
                source_root.display()
            )));
        }

        let matcher = ExcludeMatcher::new(&self.excludes)?;
        let candidates = collect_candidates(source_root, &matcher)?;
        debug!(count = candidates.len(), workers = self.workers, "Hashing files");

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| BackupError::Io(format!("Failed to start hashing pool: {}", e)))?;

        let mut records = pool.install(|| {
            candidates
                .par_iter()
                .map(|(absolute, relative)| file_record(absolute, relative))
                .collect::<BackupResult<Vec<_>>>()
        })?;

        records.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        info!(files = records.len(), "Scan complete");
        Ok(records)
    }
}

/// Scan with the default pool and seal a manifest
pub fn build_manifest(
    source_root: &Path,
    excludes: &[String],
    mode: BackupMode,
    parent_backup_id: Option<String>,
) -> BackupResult<Manifest> {
    ManifestBuilder::new(excludes).build(source_root, mode, parent_backup_id)
}

fn collect_candidates(
    root: &Path,
    matcher: &ExcludeMatcher,
) -> BackupResult<Vec<(PathBuf, String)>> {
    let mut out = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            match relative_posix(root, entry.path()) {
                Some(rel) => !matcher.prunes_dir(&rel),
                None => true,
            }
        });

    for entry in walker {
        let entry = entry
            .map_err(|e| BackupError::Io(format!("Failed to walk {}: {}", root.display(), e)))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let Some(relative) = relative_posix(root, entry.path()) else {
            warn!(path = %entry.path().display(), "Skipping file with non UTF-8 path");
            continue;
        };
        if relative == MANIFEST_MEMBER {
            warn!(
                path = %entry.path().display(),
                "Skipping root-level manifest.json, the name is reserved for the archive manifest"
            );
            continue;
        }
        if matcher.is_excluded(&relative) {
            continue;
        }
        out.push((entry.into_path(), relative));
    }

    Ok(out)
}

/// Relative path with `/` separators regardless of platform
pub fn relative_posix(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(parts.join("/"))
}

fn file_record(absolute: &Path, relative: &str) -> BackupResult<FileRecord> {
    let metadata = fs::metadata(absolute)
        .map_err(|e| BackupError::Io(format!("Failed to stat {}: {}", absolute.display(), e)))?;

    let modified_at = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or_default();

    Ok(FileRecord {
        relative_path: relative.to_string(),
        size: metadata.len(),
        sha256: sha256_file(absolute)?,
        permissions: permission_bits(&metadata),
        modified_at,
    })
}

#[cfg(unix)]
fn permission_bits(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode()
}

#[cfg(not(unix))]
fn permission_bits(metadata: &fs::Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o100444
    } else {
        0o100644
    }
}
