//! Per-partition manifest documents.
//!
//! Each `hour=` directory may carry a `_manifest.json` written by the ingest
//! side:
//!
//! ```json
//! {
//!   "min_time": 1744293600000000000,
//!   "max_time": 1744297199999999999,
//!   "files": [
//!     { "path": "a.parquet", "min_time": 1744293600000000000, "max_time": 1744295000000000000 }
//!   ]
//! }
//! ```
//!
//! Manifests are read-only here. `min_time <= max_time` and "every file
//! interval lies within the manifest interval" are expected but not enforced;
//! pruning treats declared intervals as best-effort hints.

use std::path::Path;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::{
    interval::TimeBounds,
    layout,
    storage::{self, StorageError},
};

/// Manifest of one hour partition.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PartitionManifest {
    /// Earliest instant (epoch nanoseconds) of any row in the partition.
    pub min_time: i64,
    /// Latest instant (epoch nanoseconds) of any row in the partition.
    pub max_time: i64,
    /// Backing files in write order.
    #[serde(default)]
    pub files: Vec<ManifestFile>,
}

/// One data file listed in a manifest.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManifestFile {
    /// Recorded path: absolute, or relative to the data directory root.
    pub path: String,
    /// Earliest instant in the file.
    pub min_time: i64,
    /// Latest instant in the file.
    pub max_time: i64,
}

/// Errors reading a manifest that exists.
#[derive(Debug, Snafu)]
pub enum ManifestError {
    /// The manifest file could not be read.
    #[snafu(display("Failed to read manifest: {source}"))]
    Read {
        /// Underlying storage error.
        source: StorageError,
    },

    /// The manifest is not valid JSON or does not match the schema.
    #[snafu(display("Invalid manifest at {path}: {source}"))]
    Parse {
        /// Path of the manifest.
        path: String,
        /// Underlying decode error.
        source: serde_json::Error,
    },
}

impl PartitionManifest {
    /// Decode a manifest from its JSON text.
    pub fn from_json(path: &Path, text: &str) -> Result<Self, ManifestError> {
        serde_json::from_str(text).context(ParseSnafu {
            path: path.display().to_string(),
        })
    }

    /// Files whose declared interval overlaps `bounds`; all files when `bounds` is `None`.
    pub fn files_overlapping<'a>(
        &'a self,
        bounds: Option<&'a TimeBounds>,
    ) -> impl Iterator<Item = &'a ManifestFile> + 'a {
        self.files
            .iter()
            .filter(move |f| crate::interval::overlaps(bounds, f.min_time, f.max_time))
    }
}

/// Read the manifest of `partition_dir`.
///
/// Returns `Ok(None)` when the directory has no manifest.
pub async fn read_manifest(
    partition_dir: &Path,
) -> Result<Option<PartitionManifest>, ManifestError> {
    let path = layout::manifest_path(partition_dir);
    match storage::read_to_string(&path).await {
        Ok(text) => PartitionManifest::from_json(&path, &text).map(Some),
        Err(e) if e.is_not_found() => Ok(None),
        Err(source) => Err(ManifestError::Read { source }),
    }
}
