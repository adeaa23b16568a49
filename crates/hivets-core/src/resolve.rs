//! File resolution for one measurement.
//!
//! [`PartitionResolver::resolve`] picks a strategy from the extracted time
//! range:
//!
//! - with bounds, the calendar-directed Hive walk runs first; if it yields no
//!   files the fallback scan runs with the same bounds and its result is used
//!   instead (even when it is empty too).
//! - without bounds, the fallback scan runs directly and keeps every file.
//!
//! Resolution never fails. Unreadable manifests, unreadable directories and
//! manifest entries that cannot be found are collected as [`SoftError`]s next
//! to the files that were resolved.

mod fallback;
mod hive;
mod soft_error;

use std::path::{Path, PathBuf};

use log::debug;
use serde::Serialize;

pub use soft_error::{SoftError, SoftErrorKind};

use crate::{
    interval::TimeBounds,
    layout,
    sql::TimeRange,
    storage::{self, DataLocation},
};

/// Default depth bound of the fallback walk.
pub const DEFAULT_MAX_WALK_DEPTH: usize = 10;
/// Default number of hour partitions resolved concurrently.
pub const DEFAULT_RESOLVE_CONCURRENCY: usize = 8;

/// Tuning for [`PartitionResolver`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Deepest directory level the fallback walk descends into; the
    /// measurement directory is level 0.
    pub max_walk_depth: usize,
    /// Hour partitions read concurrently by the Hive walk.
    pub concurrency: usize,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            max_walk_depth: DEFAULT_MAX_WALK_DEPTH,
            concurrency: DEFAULT_RESOLVE_CONCURRENCY,
        }
    }
}

/// Which walk produced a [`Resolution`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Calendar-directed walk over `date=/hour=` partitions.
    Hive,
    /// Recursive scan of the measurement tree.
    Fallback,
}

/// The Resolved File Set of one query plus what was skipped on the way.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Resolution {
    /// Files to scan. Order carries no meaning.
    pub files: Vec<PathBuf>,
    /// Non-fatal problems met while resolving.
    pub skipped: Vec<SoftError>,
    /// Walk that produced `files`.
    pub strategy: ResolutionStrategy,
}

impl Resolution {
    /// True when no file survived pruning.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Resolves measurements below one storage root
/// (`<root>/<database>/<measurement>/date=../hour=..`).
#[derive(Clone, Debug)]
pub struct PartitionResolver {
    location: DataLocation,
    options: ResolveOptions,
}

impl PartitionResolver {
    /// Create a resolver over `location`.
    pub fn new(location: DataLocation, options: ResolveOptions) -> Self {
        Self { location, options }
    }

    /// Storage root.
    pub fn location(&self) -> &DataLocation {
        &self.location
    }

    /// Resolver tuning.
    pub fn options(&self) -> ResolveOptions {
        self.options
    }

    /// Directory holding `database.measurement`.
    pub fn measurement_dir(&self, database: &str, measurement: &str) -> PathBuf {
        self.location.join(layout::measurement_rel_dir(database, measurement))
    }

    /// Resolve the files of `database.measurement` that may hold rows in `range`.
    pub async fn resolve(
        &self,
        database: &str,
        measurement: &str,
        range: &TimeRange,
    ) -> Resolution {
        if !layout::is_valid_component(database) || !layout::is_valid_component(measurement) {
            return Resolution {
                files: Vec::new(),
                skipped: vec![SoftError::new(
                    self.location.root(),
                    SoftErrorKind::InvalidName {
                        name: format!("{database}.{measurement}"),
                    },
                )],
                strategy: ResolutionStrategy::Fallback,
            };
        }

        let dir = self.measurement_dir(database, measurement);

        match storage::is_dir(&dir).await {
            Ok(true) => {}
            Ok(false) => {
                return Resolution {
                    files: Vec::new(),
                    skipped: vec![SoftError::new(dir, SoftErrorKind::MissingMeasurement)],
                    strategy: ResolutionStrategy::Fallback,
                };
            }
            Err(e) => {
                return Resolution {
                    files: Vec::new(),
                    skipped: vec![SoftError::new(
                        dir,
                        SoftErrorKind::DirectoryUnreadable {
                            message: e.to_string(),
                        },
                    )],
                    strategy: ResolutionStrategy::Fallback,
                };
            }
        }

        let Some(bounds) = range.bounds() else {
            debug!("{database}.{measurement}: no time bounds, scanning every file");
            return self.resolve_fallback(&dir, None).await;
        };

        let hive = self.resolve_hive(&dir, bounds).await;
        if !hive.is_empty() {
            return hive;
        }

        debug!("{database}.{measurement}: hive walk found no files, falling back to a full scan");
        let mut fallback = self.resolve_fallback(&dir, Some(bounds)).await;
        let mut skipped = hive.skipped;
        skipped.append(&mut fallback.skipped);
        fallback.skipped = skipped;
        fallback
    }

    /// Run only the calendar-directed walk over `measurement_dir`.
    pub async fn resolve_hive(&self, measurement_dir: &Path, bounds: TimeBounds) -> Resolution {
        let (files, skipped) = hive::resolve_hive(
            self.location.root(),
            measurement_dir,
            bounds,
            self.options.concurrency,
        )
        .await;
        Resolution {
            files,
            skipped,
            strategy: ResolutionStrategy::Hive,
        }
    }

    /// Run only the recursive scan over `measurement_dir`.
    pub async fn resolve_fallback(
        &self,
        measurement_dir: &Path,
        bounds: Option<TimeBounds>,
    ) -> Resolution {
        let (files, skipped) = fallback::resolve_fallback(
            self.location.root(),
            measurement_dir,
            bounds,
            self.options.max_walk_depth,
        )
        .await;
        Resolution {
            files,
            skipped,
            strategy: ResolutionStrategy::Fallback,
        }
    }
}

/// Find the file behind a manifest entry.
///
/// The recorded path is tried first (absolute, or relative to `data_root`);
/// when it does not exist, the entry's base name inside `partition_dir` is
/// tried. Neither existing is a [`SoftErrorKind::MissingFile`].
pub(crate) async fn locate_entry(
    data_root: &Path,
    partition_dir: &Path,
    recorded: &str,
) -> Result<PathBuf, SoftError> {
    let recorded_path = Path::new(recorded);
    let primary = if recorded_path.is_absolute() {
        recorded_path.to_path_buf()
    } else {
        data_root.join(recorded_path)
    };

    if matches!(storage::is_file(&primary).await, Ok(true)) {
        return Ok(primary);
    }

    if let Some(name) = recorded_path.file_name() {
        let relocated = partition_dir.join(name);
        if matches!(storage::is_file(&relocated).await, Ok(true)) {
            debug!("{recorded} relocated to {}", relocated.display());
            return Ok(relocated);
        }
    }

    Err(SoftError::new(
        partition_dir,
        SoftErrorKind::MissingFile {
            recorded: recorded.to_string(),
        },
    ))
}
