//! Request handling: extract, resolve, rewrite, execute, normalize.

use std::time::Duration;

use hivets_core::{
    resolve::{PartitionResolver, Resolution},
    sql::{self, QueryDescriptor},
    storage::DataLocation,
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use crate::{
    config::ServiceConfig,
    engine::{DataFusionEngine, QueryEngine, QueryOutput},
    error::{
        DecodeSnafu, EngineExecutionSnafu, MalformedQuerySnafu, MissingFieldSnafu, Phase,
        ResolveSnafu, ServiceError, ServiceResult,
    },
    normalize::{Row, normalize_rows, rows_from_batches},
    rewrite::{Rewrite, rewrite},
};

/// Body of a query request: `{ "query": "...", "db": "..." }`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    /// The `SELECT` statement.
    #[serde(default)]
    pub query: Option<String>,
    /// Database for an unqualified table reference.
    #[serde(default)]
    pub db: Option<String>,
}

/// Body of a raw SQL request: `{ "sql": "..." }`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSqlRequest {
    /// Statement executed verbatim.
    #[serde(default)]
    pub sql: Option<String>,
}

/// Successful response: `{ "results": [ {...}, ... ] }`.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct QueryResponse {
    /// Normalized rows.
    pub results: Vec<Row>,
}

/// Failure response: `{ "error": "..." }`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    /// Error message.
    pub error: String,
}

impl From<&ServiceError> for ErrorResponse {
    fn from(e: &ServiceError) -> Self {
        Self {
            error: e.to_string(),
        }
    }
}

/// Everything known about one executed query.
#[derive(Debug)]
pub struct QueryOutcome {
    /// The extracted descriptor.
    pub descriptor: QueryDescriptor,
    /// Files and soft errors from resolution.
    pub resolution: Resolution,
    /// Statement sent to the engine; `None` when nothing was scanned.
    pub executed_sql: Option<String>,
    /// Output column names; empty when nothing was scanned.
    pub columns: Vec<String>,
    /// Normalized rows.
    pub rows: Vec<Row>,
}

/// Query front end over one storage root and one engine.
pub struct QueryService<E = DataFusionEngine> {
    config: ServiceConfig,
    resolver: PartitionResolver,
    engine: E,
}

impl QueryService<DataFusionEngine> {
    /// Service backed by a fresh DataFusion session.
    pub fn new(config: ServiceConfig) -> Self {
        Self::with_engine(config, DataFusionEngine::new())
    }
}

fn required(field: &'static str, value: Option<String>) -> ServiceResult<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| MissingFieldSnafu { field }.build())
}

async fn with_deadline<T>(
    phase: Phase,
    after: Duration,
    fut: impl Future<Output = ServiceResult<T>>,
) -> ServiceResult<T> {
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!("query {phase} exceeded {}ms", after.as_millis());
            Err(ServiceError::Timeout { phase, after })
        }
    }
}

impl<E: QueryEngine> QueryService<E> {
    /// Service over a caller-provided engine.
    pub fn with_engine(config: ServiceConfig, engine: E) -> Self {
        let resolver = PartitionResolver::new(
            DataLocation::local(&config.data_dir),
            config.resolve_options(),
        );
        Self {
            config,
            resolver,
            engine,
        }
    }

    /// Service settings.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Handle `{ query, db }`.
    pub async fn handle_query(&self, req: QueryRequest) -> ServiceResult<QueryResponse> {
        let query = required("query", req.query)?;
        let outcome = self.query(&query, req.db.as_deref()).await?;
        Ok(QueryResponse {
            results: outcome.rows,
        })
    }

    /// Handle `{ sql }`.
    pub async fn handle_sql(&self, req: RawSqlRequest) -> ServiceResult<QueryResponse> {
        let sql = required("sql", req.sql)?;
        let output = self.execute_raw(&sql).await?;
        Ok(QueryResponse {
            results: decode(&output)?,
        })
    }

    /// Extract the descriptor of `query`.
    pub fn describe(&self, query: &str, db: Option<&str>) -> ServiceResult<QueryDescriptor> {
        let db = db
            .filter(|d| !d.trim().is_empty())
            .unwrap_or(&self.config.default_db);
        sql::extract(query, db).context(MalformedQuerySnafu)
    }

    /// Resolve the files `descriptor` must scan, under the resolution deadline.
    pub async fn resolve(&self, descriptor: &QueryDescriptor) -> ServiceResult<Resolution> {
        let resolver = self.resolver.clone();
        let database = descriptor.database.clone();
        let measurement = descriptor.measurement.clone();
        let range = descriptor.time_range.clone();

        let handle = tokio::spawn(async move {
            resolver.resolve(&database, &measurement, &range).await
        });
        let abort = handle.abort_handle();

        let result = with_deadline(Phase::Resolve, self.config.resolve_timeout, async {
            handle.await.context(ResolveSnafu)
        })
        .await;
        if result.is_err() {
            abort.abort();
        }
        result
    }

    /// Run `query` end to end.
    pub async fn query(&self, query: &str, db: Option<&str>) -> ServiceResult<QueryOutcome> {
        let descriptor = self.describe(query, db)?;
        let resolution = self.resolve(&descriptor).await?;
        info!(
            "{}.{}: {} file(s) via {:?}, {} skipped",
            descriptor.database,
            descriptor.measurement,
            resolution.files.len(),
            resolution.strategy,
            resolution.skipped.len()
        );

        match rewrite(&descriptor, &resolution.files, self.config.rewrite_strategy) {
            Rewrite::NoMatchingFiles => Ok(QueryOutcome {
                descriptor,
                resolution,
                executed_sql: None,
                columns: Vec::new(),
                rows: Vec::new(),
            }),
            Rewrite::Statement { sql, relation } => {
                let output = with_deadline(Phase::Execute, self.config.execute_timeout, async {
                    self.engine
                        .execute_over(&relation, &sql)
                        .await
                        .context(EngineExecutionSnafu)
                })
                .await?;
                let rows = decode(&output)?;
                Ok(QueryOutcome {
                    descriptor,
                    resolution,
                    executed_sql: Some(sql),
                    columns: output.column_names(),
                    rows,
                })
            }
        }
    }

    /// Run `sql` verbatim, under the execution deadline.
    pub async fn execute_raw(&self, sql: &str) -> ServiceResult<QueryOutput> {
        with_deadline(Phase::Execute, self.config.execute_timeout, async {
            self.engine
                .execute_raw(sql)
                .await
                .context(EngineExecutionSnafu)
        })
        .await
    }
}

/// Decode and normalize engine output.
pub fn decode(output: &QueryOutput) -> ServiceResult<Vec<Row>> {
    let rows = rows_from_batches(&output.batches)
        .context(DecodeSnafu)
        .context(EngineExecutionSnafu)?;
    Ok(normalize_rows(rows))
}
