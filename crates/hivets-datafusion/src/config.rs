use std::{path::PathBuf, time::Duration};

use hivets_core::resolve::{DEFAULT_MAX_WALK_DEPTH, DEFAULT_RESOLVE_CONCURRENCY, ResolveOptions};

use crate::rewrite::RewriteStrategy;

/// Database used when a statement names a bare measurement.
pub const DEFAULT_DB: &str = "default";
/// Deadline for the directory walk.
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(30);
/// Deadline for statement execution.
pub const DEFAULT_EXECUTE_TIMEOUT: Duration = Duration::from_secs(120);

/// Settings of a [`QueryService`](crate::QueryService).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Storage root holding `<database>/<measurement>/...`.
    pub data_dir: PathBuf,
    /// Database for unqualified table references.
    pub default_db: String,
    /// Depth bound of the fallback walk.
    pub max_walk_depth: usize,
    /// Hour partitions read concurrently.
    pub resolve_concurrency: usize,
    /// Deadline for resolution.
    pub resolve_timeout: Duration,
    /// Deadline for execution.
    pub execute_timeout: Duration,
    /// How statements are rewritten over the resolved files.
    pub rewrite_strategy: RewriteStrategy,
}

impl ServiceConfig {
    /// Defaults for everything but the storage root.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            default_db: DEFAULT_DB.to_string(),
            max_walk_depth: DEFAULT_MAX_WALK_DEPTH,
            resolve_concurrency: DEFAULT_RESOLVE_CONCURRENCY,
            resolve_timeout: DEFAULT_RESOLVE_TIMEOUT,
            execute_timeout: DEFAULT_EXECUTE_TIMEOUT,
            rewrite_strategy: RewriteStrategy::default(),
        }
    }

    /// Override the fallback database.
    pub fn with_default_db(mut self, db: impl Into<String>) -> Self {
        self.default_db = db.into();
        self
    }

    /// Override the rewrite strategy.
    pub fn with_rewrite_strategy(mut self, strategy: RewriteStrategy) -> Self {
        self.rewrite_strategy = strategy;
        self
    }

    /// Override both deadlines.
    pub fn with_timeouts(mut self, resolve: Duration, execute: Duration) -> Self {
        self.resolve_timeout = resolve;
        self.execute_timeout = execute;
        self
    }

    /// Resolver subset of the settings.
    pub fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions {
            max_walk_depth: self.max_walk_depth,
            concurrency: self.resolve_concurrency.max(1),
        }
    }
}
