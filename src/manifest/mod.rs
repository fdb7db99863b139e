//! Content-addressed manifests of a source tree

pub mod builder;
pub mod exclude;
pub mod model;

pub use builder::{build_manifest, default_workers, ManifestBuilder};
pub use exclude::{ExcludeMatcher, BUILTIN_EXCLUDES};
pub use model::{id_from_raw_json, BackupMode, FileRecord, Manifest, MANIFEST_VERSION};
