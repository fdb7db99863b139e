//! Manifest data model and content-addressed backup ids
//!
//! A manifest's id is the SHA-256 hex digest of its canonical JSON form
//! (keys sorted, no whitespace) with `backup_id` set to null. Recomputing the
//! id and comparing it with the stored one detects tampering or corruption.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BackupError, BackupResult};
use crate::file_io::sha256_hex;

/// Manifest format version
pub const MANIFEST_VERSION: &str = "1.0";

/// Whether a backup carries the whole tree or only changes against its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackupMode {
    #[default]
    Full,
    Incremental,
}

impl fmt::Display for BackupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Incremental => write!(f, "incremental"),
        }
    }
}

impl FromStr for BackupMode {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "incremental" => Ok(Self::Incremental),
            other => Err(BackupError::Validation(format!(
                "Unknown backup mode '{}' (expected full or incremental)",
                other
            ))),
        }
    }
}

/// One regular file captured by a manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Path relative to the source root, `/`-separated
    pub relative_path: String,
    pub size: u64,
    /// Hex SHA-256 of the file contents
    pub sha256: String,
    /// Platform mode bits
    pub permissions: u32,
    /// Modification time, epoch seconds
    pub modified_at: f64,
}

/// Declarative description of one file-tree snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    pub os_name: String,
    #[serde(rename = "runtime_id", alias = "python_version")]
    pub runtime_id: String,
    pub architecture: String,
    /// ISO-8601 UTC timestamp
    pub created_at: String,
    #[serde(default)]
    pub backup_mode: BackupMode,
    #[serde(default)]
    pub files: Vec<FileRecord>,
    #[serde(default)]
    pub parent_backup_id: Option<String>,
    #[serde(default)]
    pub backup_id: Option<String>,
}

impl Manifest {
    /// Create an unsealed manifest stamped with the current platform and time
    pub fn new(mode: BackupMode, files: Vec<FileRecord>, parent_backup_id: Option<String>) -> Self {
        Self {
            version: MANIFEST_VERSION.to_string(),
            os_name: std::env::consts::OS.to_string(),
            runtime_id: format!("termbackup {} (rust)", env!("CARGO_PKG_VERSION")),
            architecture: std::env::consts::ARCH.to_string(),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false),
            backup_mode: mode,
            files,
            parent_backup_id,
            backup_id: None,
        }
    }

    /// Sort the file list and stamp the content-addressed id
    pub fn seal(mut self) -> BackupResult<Self> {
        self.files
            .sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        self.backup_id = Some(self.compute_id()?);
        Ok(self)
    }

    /// Keep only the files matching `keep`, then re-seal
    pub fn narrow<F>(mut self, keep: F) -> BackupResult<Self>
    where
        F: FnMut(&FileRecord) -> bool,
    {
        self.files.retain(keep);
        self.seal()
    }

    /// Canonical JSON with `backup_id` nulled: the id preimage
    pub fn canonical_json(&self) -> BackupResult<String> {
        let mut value = serde_json::to_value(self)?;
        canonical_id_preimage(&mut value)
    }

    /// SHA-256 hex of the canonical JSON
    pub fn compute_id(&self) -> BackupResult<String> {
        Ok(sha256_hex(self.canonical_json()?.as_bytes()))
    }

    /// The stored id, or an integrity error for an unsealed manifest
    pub fn id(&self) -> BackupResult<&str> {
        self.backup_id
            .as_deref()
            .ok_or_else(|| BackupError::Integrity("Manifest has no backup_id".into()))
    }

    /// Whether the stored id matches a recomputation
    pub fn verify_id(&self) -> BackupResult<bool> {
        Ok(self.id()? == self.compute_id()?)
    }

    /// Serialize for embedding in an archive payload (compact, keys sorted)
    pub fn to_json(&self) -> BackupResult<String> {
        let value = serde_json::to_value(self)?;
        Ok(serde_json::to_string(&value)?)
    }

    pub fn from_json(raw: &str) -> BackupResult<Self> {
        serde_json::from_str(raw)
            .map_err(|e| BackupError::Json(format!("Invalid manifest: {}", e)))
    }

    /// Files keyed by relative path
    pub fn file_map(&self) -> BTreeMap<&str, &FileRecord> {
        self.files
            .iter()
            .map(|f| (f.relative_path.as_str(), f))
            .collect()
    }

    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

/// Recompute an id straight from a stored manifest document
///
/// Works on the raw JSON so documents written by other versions (e.g. with a
/// `python_version` key) verify against the bytes they were hashed from.
pub fn id_from_raw_json(raw: &str) -> BackupResult<(Option<String>, String)> {
    let mut value: Value = serde_json::from_str(raw)
        .map_err(|e| BackupError::Json(format!("Invalid manifest: {}", e)))?;
    let stored = value
        .get("backup_id")
        .and_then(Value::as_str)
        .map(str::to_string);
    let canonical = canonical_id_preimage(&mut value)?;
    Ok((stored, sha256_hex(canonical.as_bytes())))
}

fn canonical_id_preimage(value: &mut Value) -> BackupResult<String> {
    let object = value
        .as_object_mut()
        .ok_or_else(|| BackupError::Json("Manifest is not a JSON object".into()))?;
    object.insert("backup_id".to_string(), Value::Null);
    // serde_json's default map is ordered by key
    Ok(serde_json::to_string(value)?)
}
