//! Gzip-compressed tar payloads
//!
//! The first member is always `manifest.json`; the backed-up files follow at
//! their relative paths.

use std::io::Read;
use std::path::{Component, Path};

use chrono::Utc;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{debug, warn};

use crate::error::{BackupError, BackupResult};
use crate::manifest::Manifest;

/// Name of the manifest member inside every payload
pub const MANIFEST_MEMBER: &str = "manifest.json";

/// Tar the manifest plus every file it lists, then gzip at `level` (0-9)
pub fn build_payload(manifest: &Manifest, source_root: &Path, level: u32) -> BackupResult<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::new(level.min(9)));
    let mut builder = tar::Builder::new(encoder);

    let json = manifest.to_json()?;
    let mut header = tar::Header::new_gnu();
    header.set_size(json.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(Utc::now().timestamp().max(0) as u64);
    header.set_cksum();
    builder
        .append_data(&mut header, MANIFEST_MEMBER, json.as_bytes())
        .map_err(archive_err("append manifest"))?;

    for record in &manifest.files {
        let absolute = source_root.join(&record.relative_path);
        builder
            .append_path_with_name(&absolute, &record.relative_path)
            .map_err(|e| {
                BackupError::Archive(format!("Failed to add {}: {}", record.relative_path, e))
            })?;
    }

    let encoder = builder.into_inner().map_err(archive_err("finish tar stream"))?;
    let bytes = encoder.finish().map_err(archive_err("finish gzip stream"))?;
    debug!(files = manifest.files.len(), bytes = bytes.len(), "Payload built");
    Ok(bytes)
}

/// Outcome of extracting one payload
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExtractStats {
    /// Relative paths written to disk
    pub written: Vec<String>,
    /// Members refused because they were absolute or escaped the target
    pub skipped_unsafe: usize,
    /// Members the caller chose not to write
    pub skipped_existing: usize,
}

/// A decrypted, still-compressed payload
#[derive(Debug, Clone)]
pub struct Payload {
    compressed: Vec<u8>,
}

impl Payload {
    pub fn new(compressed: Vec<u8>) -> Self {
        Self { compressed }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.compressed
    }

    fn archive(&self) -> tar::Archive<GzDecoder<&[u8]>> {
        tar::Archive::new(GzDecoder::new(self.compressed.as_slice()))
    }

    /// Raw manifest document exactly as stored
    pub fn manifest_json(&self) -> BackupResult<String> {
        let mut archive = self.archive();
        for entry in archive.entries().map_err(archive_err("read payload"))? {
            let mut entry = entry.map_err(archive_err("read payload member"))?;
            let is_manifest = entry
                .path()
                .map(|p| &*p == Path::new(MANIFEST_MEMBER))
                .unwrap_or(false);
            if is_manifest {
                let mut json = String::new();
                entry
                    .read_to_string(&mut json)
                    .map_err(archive_err("read manifest"))?;
                return Ok(json);
            }
        }
        Err(BackupError::Archive(format!(
            "Payload has no {} member",
            MANIFEST_MEMBER
        )))
    }

    pub fn manifest(&self) -> BackupResult<Manifest> {
        Manifest::from_json(&self.manifest_json()?)
    }

    /// Safe relative paths of every regular-file member except the manifest
    pub fn member_paths(&self) -> BackupResult<Vec<String>> {
        let mut out = Vec::new();
        let mut archive = self.archive();
        for entry in archive.entries().map_err(archive_err("read payload"))? {
            let entry = entry.map_err(archive_err("read payload member"))?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let path = entry.path().map_err(archive_err("read member path"))?;
            if let Some(rel) = safe_member_path(&path) {
                if rel != MANIFEST_MEMBER {
                    out.push(rel);
                }
            }
        }
        Ok(out)
    }

    /// Write file members under `dest`, asking `should_write` for each safe path
    pub fn extract<F>(&self, dest: &Path, mut should_write: F) -> BackupResult<ExtractStats>
    where
        F: FnMut(&str) -> bool,
    {
        let mut stats = ExtractStats::default();
        let mut archive = self.archive();

        for entry in archive.entries().map_err(archive_err("read payload"))? {
            let mut entry = entry.map_err(archive_err("read payload member"))?;
            if !entry.header().entry_type().is_file() {
                continue;
            }

            let path = entry
                .path()
                .map_err(archive_err("read member path"))?
                .into_owned();
            let Some(rel) = safe_member_path(&path) else {
                warn!(member = %path.display(), "Skipping unsafe archive member");
                stats.skipped_unsafe += 1;
                continue;
            };
            if rel == MANIFEST_MEMBER {
                continue;
            }
            if !should_write(&rel) {
                stats.skipped_existing += 1;
                continue;
            }

            let unpacked = entry
                .unpack_in(dest)
                .map_err(|e| BackupError::Archive(format!("Failed to extract {}: {}", rel, e)))?;
            if unpacked {
                stats.written.push(rel);
            } else {
                warn!(member = %rel, "Archive member escaped the target directory");
                stats.skipped_unsafe += 1;
            }
        }

        Ok(stats)
    }
}

/// `/`-joined member path, or `None` for absolute or `..` paths
pub fn safe_member_path(path: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

fn archive_err(action: &'static str) -> impl Fn(std::io::Error) -> BackupError {
    move |e| BackupError::Archive(format!("Failed to {}: {}", action, e))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Hand-built payload with arbitrary member names, bypassing the builder
    pub fn raw_payload(members: &[(&str, &[u8])]) -> Payload {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for (name, data) in members {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            // Write the name bytes directly so `..` survives
            let bytes = name.as_bytes();
            header.as_old_mut().name[..bytes.len()].copy_from_slice(bytes);
            header.set_cksum();
            builder.append(&header, *data).unwrap();
        }
        Payload::new(builder.into_inner().unwrap().finish().unwrap())
    }
}
