use std::{fmt, path::PathBuf};

use log::warn;
use serde::Serialize;

/// Why a directory or manifest entry was skipped during resolution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SoftErrorKind {
    /// A manifest exists but could not be read or decoded.
    PartialManifestReadFailure {
        /// Read or decode error text.
        message: String,
    },
    /// A directory could not be listed or canonicalized.
    DirectoryUnreadable {
        /// I/O error text.
        message: String,
    },
    /// A manifest entry whose file exists neither at its recorded path nor
    /// under its base name inside the partition directory.
    MissingFile {
        /// Path as recorded in the manifest.
        recorded: String,
    },
    /// A subdirectory below the configured walk depth was not visited.
    DepthLimit {
        /// The configured maximum depth.
        max_depth: usize,
    },
    /// A directory was reached a second time through a symbolic link.
    Cycle,
    /// The measurement directory does not exist.
    MissingMeasurement,
    /// A database or measurement name that is not a single path component.
    InvalidName {
        /// `database.measurement` as requested.
        name: String,
    },
}

/// A non-fatal resolution problem, reported next to the files that were found.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SoftError {
    /// Directory or file the problem relates to.
    pub path: PathBuf,
    /// What went wrong.
    #[serde(flatten)]
    pub kind: SoftErrorKind,
}

impl SoftError {
    /// Record a soft error and log it at `warn` level.
    pub fn new(path: impl Into<PathBuf>, kind: SoftErrorKind) -> Self {
        let err = Self {
            path: path.into(),
            kind,
        };
        warn!("skipping during resolution: {err}");
        err
    }
}

impl fmt::Display for SoftError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = self.path.display();
        match &self.kind {
            SoftErrorKind::PartialManifestReadFailure { message } => {
                write!(f, "unreadable manifest in {path}: {message}")
            }
            SoftErrorKind::DirectoryUnreadable { message } => {
                write!(f, "unreadable directory {path}: {message}")
            }
            SoftErrorKind::MissingFile { recorded } => {
                write!(f, "manifest entry {recorded} not found (partition {path})")
            }
            SoftErrorKind::DepthLimit { max_depth } => {
                write!(f, "{path} is deeper than the walk limit of {max_depth}")
            }
            SoftErrorKind::Cycle => write!(f, "{path} was already visited (symlink cycle)"),
            SoftErrorKind::MissingMeasurement => {
                write!(f, "measurement directory {path} does not exist")
            }
            SoftErrorKind::InvalidName { name } => {
                write!(f, "{name} does not name a directory under {path}")
            }
        }
    }
}
