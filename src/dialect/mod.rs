pub mod postgres;
pub mod sqlite;

use crate::models::{
    ForeignKey, IndexAnalysis, IndexDefinition, IndexInfo, PlanSummary, SlowQuery, TableSchema,
};
use async_trait::async_trait;
use snafu::Snafu;
use std::sync::Arc;
use tracing::{info, warn};

pub use postgres::PostgresStrategy;
pub use sqlite::SqliteStrategy;

#[derive(Debug, Snafu)]
pub enum DialectError {
    #[snafu(display("unsupported database URL scheme: {}", url))]
    UnsupportedScheme { url: String },

    #[snafu(display("failed to connect to database: {}", source))]
    Connection { source: sqlx::Error },

    #[snafu(display("failed to execute query: {}", query))]
    Query { query: String, source: sqlx::Error },

    #[snafu(display("failed to decode explain plan: {}", source))]
    PlanDecode { source: serde_json::Error },
}

pub type Result<T, E = DialectError> = std::result::Result<T, E>;

/// The supported database engine variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::Postgres => "postgresql",
        }
    }
}

/// Everything the engine needs from a specific database dialect, selected
/// once at connection time. Each implementation owns its own `sqlx` pool.
///
/// Reflection methods query the live catalog on every call; nothing is
/// cached, so there is no staleness window to reason about.
#[async_trait]
pub trait DialectStrategy: Send + Sync {
    fn dialect(&self) -> Dialect;

    async fn list_tables(&self) -> Result<Vec<String>>;

    async fn table_columns(&self, table: &str) -> Result<Vec<String>>;

    async fn table_indexes(&self, table: &str) -> Result<Vec<IndexInfo>>;

    async fn table_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>>;

    async fn table_row_count(&self, table: &str) -> Result<i64>;

    /// On-disk size of a table; `None` where the engine exposes no cheap
    /// size source (SQLite).
    async fn table_size_bytes(&self, table: &str) -> Option<i64>;

    /// Renders `CREATE INDEX` DDL for this dialect.
    fn create_index_ddl(&self, def: &IndexDefinition) -> String;

    /// Renders `DROP INDEX IF EXISTS` DDL for this dialect.
    fn drop_index_ddl(&self, name: &str, table: &str) -> String;

    async fn execute_ddl(&self, sql: &str) -> Result<()>;

    /// Runs the engine's explain facility over `sql` and normalizes the
    /// output into a dialect-neutral summary.
    async fn explain_plan(&self, sql: &str) -> Result<PlanSummary>;

    /// Scores every existing index. PostgreSQL reads engine usage
    /// counters; SQLite probes the planner (plannability, not history).
    async fn index_usage(&self, usage_threshold: i64) -> Result<Vec<IndexAnalysis>>;

    /// Slow/representative queries from engine statistics. Degrades to an
    /// empty list when no source exists (SQLite, or PostgreSQL without
    /// pg_stat_statements).
    async fn slow_queries(&self, limit: usize) -> Result<Vec<SlowQuery>>;
}

/// Connects to `url`, inferring the dialect from the URL scheme. Any
/// scheme other than `sqlite:` or `postgres:`/`postgresql:` is rejected
/// outright; there is no meaningful degraded behavior for an unknown
/// engine.
pub async fn connect(url: &str) -> Result<Arc<dyn DialectStrategy>> {
    let scheme = url.split(':').next().unwrap_or_default();
    match scheme {
        "sqlite" => {
            info!("Connecting to SQLite database");
            Ok(Arc::new(SqliteStrategy::connect(url).await?))
        }
        "postgres" | "postgresql" => {
            info!("Connecting to PostgreSQL database");
            Ok(Arc::new(PostgresStrategy::connect(url).await?))
        }
        _ => UnsupportedSchemeSnafu { url }.fail(),
    }
}

/// Reflects the full schema, one table at a time. An unreflectable table
/// (dropped concurrently, permissions) is skipped with a warning instead
/// of aborting the whole pass.
pub async fn reflect_schema(strategy: &dyn DialectStrategy) -> Result<Vec<TableSchema>> {
    let mut tables = Vec::new();
    for name in strategy.list_tables().await? {
        match reflect_table(strategy, &name).await {
            Ok(table) => tables.push(table),
            Err(err) => warn!("Skipping unreflectable table {}: {}", name, err),
        }
    }
    Ok(tables)
}

async fn reflect_table(strategy: &dyn DialectStrategy, name: &str) -> Result<TableSchema> {
    let columns = strategy.table_columns(name).await?;
    let indexes = strategy.table_indexes(name).await?;
    let foreign_keys = strategy.table_foreign_keys(name).await?;
    let row_count = strategy.table_row_count(name).await?;
    let size_bytes = strategy.table_size_bytes(name).await;

    Ok(TableSchema {
        name: name.to_string(),
        columns,
        indexes,
        foreign_keys,
        row_count,
        size_bytes,
    })
}

/// Double-quotes an identifier, escaping embedded quotes. Both dialects
/// accept this quoting form.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
