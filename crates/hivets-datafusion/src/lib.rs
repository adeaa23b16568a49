//! DataFusion execution for `hivets-core`.
//!
//! All DataFusion and Arrow types stay in this crate. The entry point is
//! [`QueryService`], which turns a `SELECT` over a logical
//! `[db.]measurement` into a scan of only the Parquet files whose declared
//! time intervals overlap the statement's time predicate:
//!
//! 1. extract a [`QueryDescriptor`](hivets_core::sql::QueryDescriptor),
//! 2. resolve the file set with [`PartitionResolver`](hivets_core::resolve::PartitionResolver),
//! 3. [`rewrite`] the statement over a [`VirtualRelation`],
//! 4. execute on the serialized [`DataFusionEngine`],
//! 5. decode and [`normalize`] rows for JSON transport.
#![deny(missing_docs)]

mod config;
mod engine;
mod error;
pub mod normalize;
pub mod rewrite;
mod service;

pub use config::{DEFAULT_DB, DEFAULT_EXECUTE_TIMEOUT, DEFAULT_RESOLVE_TIMEOUT, ServiceConfig};
pub use engine::{DataFusionEngine, QueryEngine, QueryOutput};
pub use error::{EngineError, EngineResult, Phase, ServiceError, ServiceResult};
pub use normalize::{CellValue, Row};
pub use rewrite::{Rewrite, RewriteStrategy, VirtualRelation};
pub use service::{
    ErrorResponse, QueryOutcome, QueryRequest, QueryResponse, QueryService, RawSqlRequest, decode,
};
