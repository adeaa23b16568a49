//! The execution seam: a serialized DataFusion session.

use std::sync::Arc;

use arrow::{
    datatypes::{Schema, SchemaRef},
    record_batch::RecordBatch,
};
use datafusion::{
    datasource::{
        file_format::parquet::ParquetFormat,
        listing::{ListingOptions, ListingTable, ListingTableConfig, ListingTableUrl},
    },
    physical_plan::RecordBatchStream,
    prelude::{SessionConfig, SessionContext},
};
use futures::StreamExt;
use log::{debug, warn};
use snafu::ResultExt;
use tokio::sync::Mutex;

use crate::{
    error::{DataFusionSnafu, EngineResult, InferSchemaSnafu, InvalidPathSnafu, SchemaMergeSnafu},
    rewrite::VirtualRelation,
};

/// Batches produced by one statement.
#[derive(Clone, Debug)]
pub struct QueryOutput {
    /// Output schema, known even when no rows were produced.
    pub schema: SchemaRef,
    /// Result batches in engine order.
    pub batches: Vec<RecordBatch>,
}

impl QueryOutput {
    /// Total row count over all batches.
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    /// Output column names.
    pub fn column_names(&self) -> Vec<String> {
        self.schema.fields().iter().map(|f| f.name().to_string()).collect()
    }
}

/// Executes statements for the query service.
#[async_trait::async_trait]
pub trait QueryEngine: Send + Sync + 'static {
    /// Register `relation`, run `sql` against it, and drop the registration.
    async fn execute_over(
        &self,
        relation: &VirtualRelation,
        sql: &str,
    ) -> EngineResult<QueryOutput>;

    /// Run `sql` as given.
    async fn execute_raw(&self, sql: &str) -> EngineResult<QueryOutput>;
}

/// A single DataFusion session shared by every request.
///
/// Executions are serialized: the session lock is held from relation
/// registration until the relation is dropped again.
pub struct DataFusionEngine {
    ctx: Mutex<SessionContext>,
}

impl Default for DataFusionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DataFusionEngine {
    /// Engine with a default session.
    pub fn new() -> Self {
        Self::with_config(SessionConfig::new())
    }

    /// Engine with a caller-provided session configuration.
    pub fn with_config(cfg: SessionConfig) -> Self {
        Self {
            ctx: Mutex::new(SessionContext::new_with_config(cfg)),
        }
    }
}

/// Register `relation` as a Parquet listing table over its files.
///
/// Each file's schema is read and the schemas are merged by column name;
/// files lacking a column yield nulls for it.
async fn register_relation(ctx: &SessionContext, relation: &VirtualRelation) -> EngineResult<()> {
    let state = ctx.state();
    // The file list is exact; an extension filter would drop `.PARQUET` files
    // and manifest entries with other names.
    let options =
        ListingOptions::new(Arc::new(ParquetFormat::default())).with_file_extension("");

    let mut urls = Vec::with_capacity(relation.files.len());
    let mut schemas = Vec::with_capacity(relation.files.len());
    for file in &relation.files {
        let path = file.to_string_lossy().into_owned();
        let url = ListingTableUrl::parse(&path).context(InvalidPathSnafu { path: path.clone() })?;
        let schema = options
            .infer_schema(&state, &url)
            .await
            .context(InferSchemaSnafu { path })?;
        schemas.push(schema.as_ref().clone());
        urls.push(url);
    }

    let schema = Schema::try_merge(schemas).context(SchemaMergeSnafu)?;
    debug!(
        "registering {} over {} file(s), {} column(s)",
        relation.name,
        urls.len(),
        schema.fields().len()
    );

    let config = ListingTableConfig::new_with_multi_paths(urls)
        .with_listing_options(options)
        .with_schema(Arc::new(schema));
    let table = ListingTable::try_new(config).context(DataFusionSnafu)?;
    ctx.register_table(relation.name.as_str(), Arc::new(table))
        .context(DataFusionSnafu)?;
    Ok(())
}

/// Deregisters a relation when dropped, including when the execution future
/// is cancelled by a deadline.
struct RegisteredRelation<'a> {
    ctx: &'a SessionContext,
    name: &'a str,
}

impl Drop for RegisteredRelation<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.ctx.deregister_table(self.name) {
            warn!("failed to drop relation {}: {e}", self.name);
        }
    }
}

async fn run(ctx: &SessionContext, sql: &str) -> EngineResult<QueryOutput> {
    let df = ctx.sql(sql).await.context(DataFusionSnafu)?;
    let mut stream = df.execute_stream().await.context(DataFusionSnafu)?;
    let schema = stream.schema();

    let mut batches = Vec::new();
    while let Some(item) = stream.next().await {
        batches.push(item.context(DataFusionSnafu)?);
    }
    Ok(QueryOutput { schema, batches })
}

#[async_trait::async_trait]
impl QueryEngine for DataFusionEngine {
    async fn execute_over(
        &self,
        relation: &VirtualRelation,
        sql: &str,
    ) -> EngineResult<QueryOutput> {
        let ctx = self.ctx.lock().await;
        register_relation(&ctx, relation).await?;
        let _registered = RegisteredRelation {
            ctx: &ctx,
            name: relation.name.as_str(),
        };
        debug!("executing: {sql}");
        run(&ctx, sql).await
    }

    async fn execute_raw(&self, sql: &str) -> EngineResult<QueryOutput> {
        let ctx = self.ctx.lock().await;
        debug!("executing raw statement: {sql}");
        run(&ctx, sql).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use arrow::datatypes::{DataType, Field};

    use super::*;

    #[test]
    fn dropping_the_registration_deregisters_the_relation() {
        let ctx = SessionContext::new();
        let schema = Arc::new(Schema::new(vec![Field::new("v", DataType::Int64, true)]));
        ctx.register_batch("weather__q1", RecordBatch::new_empty(schema))
            .unwrap();
        assert!(ctx.table_exist("weather__q1").unwrap());

        drop(RegisteredRelation {
            ctx: &ctx,
            name: "weather__q1",
        });
        assert!(!ctx.table_exist("weather__q1").unwrap());
    }

    #[tokio::test]
    async fn cancelled_execution_leaves_no_relation_behind() {
        let engine = DataFusionEngine::new();
        let schema = Arc::new(Schema::new(vec![Field::new("v", DataType::Int64, true)]));
        {
            let ctx = engine.ctx.lock().await;
            ctx.register_batch("weather__q2", RecordBatch::new_empty(schema))
                .unwrap();
        }

        let stuck = async {
            let ctx = engine.ctx.lock().await;
            let _registered = RegisteredRelation {
                ctx: &ctx,
                name: "weather__q2",
            };
            std::future::pending::<()>().await;
        };
        assert!(
            tokio::time::timeout(Duration::from_millis(20), stuck)
                .await
                .is_err()
        );

        let ctx = engine.ctx.lock().await;
        assert!(!ctx.table_exist("weather__q2").unwrap());
    }
}
