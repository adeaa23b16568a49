//! CLI for querying Hive-partitioned Parquet time series.

mod error;
mod output;

use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand, ValueEnum};
use hivets_core::line_protocol::{group_by_partition, parse_lines};
use hivets_datafusion::{
    QueryRequest, QueryService, RawSqlRequest, RewriteStrategy, ServiceConfig, ServiceError,
};
use snafu::ResultExt;

use crate::{
    error::{
        CliResult, InvalidRequestSnafu, LineProtocolSnafu, ReadInputSnafu, ServiceSnafu,
        WriteOutputSnafu,
    },
    output::{OutputFormat, write_partitions, write_resolution, write_rows},
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormatArg {
    Json,
    Table,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(v: OutputFormatArg) -> Self {
        match v {
            OutputFormatArg::Json => OutputFormat::Json,
            OutputFormatArg::Table => OutputFormat::Table,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StrategyArg {
    /// Rebuild the statement from its extracted clauses
    Clauses,
    /// Replace only the table reference in the original text
    Substitute,
}

impl From<StrategyArg> for RewriteStrategy {
    fn from(v: StrategyArg) -> Self {
        match v {
            StrategyArg::Clauses => RewriteStrategy::ClauseReconstruction,
            StrategyArg::Substitute => RewriteStrategy::TextualSubstitution,
        }
    }
}

#[derive(Debug, Args)]
struct ServiceArgs {
    /// Storage root holding `<db>/<measurement>/date=.../hour=...`
    #[arg(long, env = "HIVETS_DATA_DIR", default_value = "data", global = true)]
    data_dir: PathBuf,

    /// Database for unqualified table references
    #[arg(long = "default-db", env = "HIVETS_DEFAULT_DB", default_value = hivets_datafusion::DEFAULT_DB, global = true)]
    default_db: String,

    /// Deepest directory level visited by the fallback scan
    #[arg(long, env = "HIVETS_MAX_WALK_DEPTH", default_value_t = hivets_core::resolve::DEFAULT_MAX_WALK_DEPTH, global = true)]
    max_walk_depth: usize,

    /// Hour partitions resolved concurrently
    #[arg(long, env = "HIVETS_RESOLVE_CONCURRENCY", default_value_t = hivets_core::resolve::DEFAULT_RESOLVE_CONCURRENCY, global = true)]
    concurrency: usize,

    /// Resolution deadline in seconds
    #[arg(long, env = "HIVETS_RESOLVE_TIMEOUT_SECS", default_value_t = hivets_datafusion::DEFAULT_RESOLVE_TIMEOUT.as_secs(), global = true)]
    resolve_timeout_secs: u64,

    /// Execution deadline in seconds
    #[arg(long, env = "HIVETS_EXECUTE_TIMEOUT_SECS", default_value_t = hivets_datafusion::DEFAULT_EXECUTE_TIMEOUT.as_secs(), global = true)]
    execute_timeout_secs: u64,

    /// How statements are rewritten over the resolved files
    #[arg(long, value_enum, env = "HIVETS_REWRITE_STRATEGY", default_value_t = StrategyArg::Clauses, global = true)]
    strategy: StrategyArg,
}

impl ServiceArgs {
    fn config(&self) -> ServiceConfig {
        let mut config = ServiceConfig::new(&self.data_dir)
            .with_default_db(&self.default_db)
            .with_rewrite_strategy(self.strategy.into())
            .with_timeouts(
                Duration::from_secs(self.resolve_timeout_secs),
                Duration::from_secs(self.execute_timeout_secs),
            );
        config.max_walk_depth = self.max_walk_depth;
        config.resolve_concurrency = self.concurrency;
        config
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a SELECT over one measurement, scanning only overlapping files
    Query {
        /// Statement to run (alternatively pass --request)
        #[arg(long, conflicts_with = "request")]
        sql: Option<String>,

        /// Request body as JSON: {"query": "...", "db": "..."}
        #[arg(long)]
        request: Option<String>,

        /// Database for an unqualified table reference
        #[arg(long)]
        db: Option<String>,

        #[arg(long, value_enum, default_value_t = OutputFormatArg::Json)]
        format: OutputFormatArg,

        /// Rows shown in table output
        #[arg(long, default_value_t = 20)]
        max_rows: usize,

        /// Print elapsed time to stderr
        #[arg(long, default_value_t = false)]
        timing: bool,
    },

    /// Execute a statement verbatim, without resolution
    Sql {
        #[arg(long)]
        sql: Option<String>,

        #[arg(long, value_enum, default_value_t = OutputFormatArg::Json)]
        format: OutputFormatArg,

        #[arg(long, default_value_t = 20)]
        max_rows: usize,
    },

    /// Show which files a statement would scan
    Resolve {
        #[arg(long)]
        sql: String,

        #[arg(long)]
        db: Option<String>,

        #[arg(long, value_enum, default_value_t = OutputFormatArg::Json)]
        format: OutputFormatArg,
    },

    /// Decode line protocol and show the hour partitions it maps to
    ParseLines {
        /// Input file (stdin when omitted)
        #[arg(long)]
        input: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t = OutputFormatArg::Json)]
        format: OutputFormatArg,
    },
}

#[derive(Debug, Parser)]
#[command(name = "hivets", version)]
struct Cli {
    #[command(flatten)]
    service: ServiceArgs,

    /// Log debug output to stderr (overridden by RUST_LOG)
    #[arg(long, short, default_value_t = false, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .try_init();
}

async fn cmd_query(
    service: &QueryService,
    sql: Option<String>,
    request: Option<String>,
    db: Option<String>,
    format: OutputFormat,
    max_rows: usize,
    timing: bool,
) -> CliResult<()> {
    let start = Instant::now();
    let mut req = match request {
        Some(body) => serde_json::from_str::<QueryRequest>(&body).context(InvalidRequestSnafu)?,
        None => QueryRequest::default(),
    };
    if sql.is_some() {
        req.query = sql;
    }
    if db.is_some() {
        req.db = db;
    }

    let query = match req.query {
        Some(q) if !q.trim().is_empty() => q,
        _ => return Err(ServiceError::MissingField { field: "query" }).context(ServiceSnafu),
    };
    let outcome = service
        .query(&query, req.db.as_deref())
        .await
        .context(ServiceSnafu)?;

    if let Some(executed) = &outcome.executed_sql {
        log::debug!("executed: {executed}");
    }

    let mut stdout = std::io::stdout().lock();
    write_rows(
        &outcome.columns,
        &outcome.rows,
        format,
        max_rows,
        &mut stdout,
    )?;

    if timing {
        eprintln!(
            "files: {}, strategy: {:?}, elapsed_ms: {}",
            outcome.resolution.files.len(),
            outcome.resolution.strategy,
            start.elapsed().as_millis()
        );
    }
    Ok(())
}

async fn cmd_sql(
    service: &QueryService,
    sql: Option<String>,
    format: OutputFormat,
    max_rows: usize,
) -> CliResult<()> {
    let response = service
        .handle_sql(RawSqlRequest { sql })
        .await
        .context(ServiceSnafu)?;
    let mut stdout = std::io::stdout().lock();
    write_rows(&[], &response.results, format, max_rows, &mut stdout)
}

async fn cmd_resolve(
    service: &QueryService,
    sql: &str,
    db: Option<&str>,
    format: OutputFormat,
) -> CliResult<()> {
    let descriptor = service.describe(sql, db).context(ServiceSnafu)?;
    let resolution = service.resolve(&descriptor).await.context(ServiceSnafu)?;
    let mut stdout = std::io::stdout().lock();
    write_resolution(&descriptor, &resolution, format, &mut stdout)
}

fn cmd_parse_lines(input: Option<PathBuf>, format: OutputFormat) -> CliResult<()> {
    let text = match &input {
        Some(path) => std::fs::read_to_string(path).context(ReadInputSnafu {
            path: input.clone(),
        })?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context(ReadInputSnafu { path: None })?;
            buf
        }
    };

    let points = parse_lines(&text).context(LineProtocolSnafu)?;
    let batches = group_by_partition(points);

    let mut stdout = std::io::stdout().lock();
    write_partitions(&batches, format, &mut stdout)?;
    stdout.flush().context(WriteOutputSnafu)
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let service = QueryService::new(cli.service.config());

    match cli.cmd {
        Command::Query {
            sql,
            request,
            db,
            format,
            max_rows,
            timing,
        } => {
            cmd_query(
                &service,
                sql,
                request,
                db,
                format.into(),
                max_rows,
                timing,
            )
            .await
        }

        Command::Sql {
            sql,
            format,
            max_rows,
        } => cmd_sql(&service, sql, format.into(), max_rows).await,

        Command::Resolve { sql, db, format } => {
            cmd_resolve(&service, &sql, db.as_deref(), format.into()).await
        }

        Command::ParseLines { input, format } => cmd_parse_lines(input, format.into()),
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
