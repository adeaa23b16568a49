use std::{fmt, time::Duration};

use arrow::error::ArrowError;
use datafusion::error::DataFusionError;
use hivets_core::sql::ExtractError;
use snafu::Snafu;
use tokio::task::JoinError;

/// Errors raised while registering a relation or running a statement.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum EngineError {
    /// A resolved path could not be turned into a listing URL.
    #[snafu(display("Invalid data file path {path}: {source}"))]
    InvalidPath {
        /// The offending path.
        path: String,
        /// Underlying DataFusion error.
        source: DataFusionError,
    },

    /// The schema of one data file could not be read.
    #[snafu(display("Failed to read schema of {path}: {source}"))]
    InferSchema {
        /// File whose footer could not be read.
        path: String,
        /// Underlying DataFusion error.
        source: DataFusionError,
    },

    /// Two data files disagree on a column type.
    #[snafu(display("Data files have incompatible schemas: {source}"))]
    SchemaMerge {
        /// Underlying Arrow error.
        source: ArrowError,
    },

    /// Planning or execution failed inside DataFusion.
    #[snafu(display("{source}"))]
    DataFusion {
        /// Underlying DataFusion error.
        source: DataFusionError,
    },

    /// A result batch could not be decoded into rows.
    #[snafu(display("Failed to decode result batch: {source}"))]
    Decode {
        /// Underlying Arrow error.
        source: ArrowError,
    },
}

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// The phase a deadline applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Directory walk and manifest reads.
    Resolve,
    /// Statement execution on the engine.
    Execute,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Resolve => f.write_str("resolution"),
            Phase::Execute => f.write_str("execution"),
        }
    }
}

/// Errors surfaced to callers of the query service.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ServiceError {
    /// A required request field is absent or blank.
    #[snafu(display("Missing required field '{field}'"))]
    MissingField {
        /// Field name.
        field: &'static str,
    },

    /// The statement has no resolvable table target or an unsupported shape.
    #[snafu(display("{source}"))]
    MalformedQuery {
        /// Extraction failure.
        source: ExtractError,
    },

    /// The engine rejected or failed the statement.
    #[snafu(display("Query execution failed: {source}"))]
    EngineExecution {
        /// Engine failure, message preserved.
        #[snafu(source(from(EngineError, Box::new)))]
        source: Box<EngineError>,
    },

    /// A phase ran past its deadline.
    #[snafu(display("Query {phase} timed out after {}ms", after.as_millis()))]
    Timeout {
        /// Phase that expired.
        phase: Phase,
        /// Configured deadline.
        after: Duration,
    },

    /// The resolution task stopped before producing a result.
    #[snafu(display("Partition resolution task failed: {source}"))]
    Resolve {
        /// Join failure of the resolution task.
        source: JoinError,
    },
}

/// Result alias for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    /// HTTP status an upstream layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::MissingField { .. } | ServiceError::MalformedQuery { .. } => 400,
            ServiceError::Timeout { .. } => 504,
            ServiceError::EngineExecution { .. } | ServiceError::Resolve { .. } => 500,
        }
    }

    /// True when the same request may succeed if sent again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Timeout { .. })
    }
}
