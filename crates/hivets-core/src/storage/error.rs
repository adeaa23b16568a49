use std::{error::Error, fmt, io};

use snafu::{Backtrace, prelude::*};

/// Failure reported by the filesystem backend.
#[derive(Debug)]
pub enum BackendError {
    /// A local filesystem I/O error.
    Local(io::Error),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Local(e) => write!(f, "local I/O error: {e}"),
        }
    }
}

impl Error for BackendError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BackendError::Local(e) => Some(e),
        }
    }
}

/// Errors raised while reading the partitioned data directory.
///
/// Resolution turns every one of these into a soft error; they never abort a
/// query.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    /// Nothing exists at `path`.
    #[snafu(display("Path not found: {path}"))]
    NotFound {
        /// Missing path.
        path: String,
        /// Backend failure.
        source: BackendError,
        /// Where the failure was observed.
        backtrace: Backtrace,
    },

    /// The process may not read `path`.
    #[snafu(display("Permission denied: {path}"))]
    PermissionDenied {
        /// Protected path.
        path: String,
        /// Backend failure.
        source: BackendError,
        /// Where the failure was observed.
        backtrace: Backtrace,
    },

    /// Any other read failure.
    #[snafu(display("Failed to read {path}: {source}"))]
    Unreadable {
        /// Path being read.
        path: String,
        /// Backend failure.
        source: BackendError,
        /// Where the failure was observed.
        backtrace: Backtrace,
    },
}

impl StorageError {
    /// The path the failing operation was working on.
    pub fn path(&self) -> &str {
        match self {
            StorageError::NotFound { path, .. }
            | StorageError::PermissionDenied { path, .. }
            | StorageError::Unreadable { path, .. } => path,
        }
    }

    /// True when the failure means the path does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}
