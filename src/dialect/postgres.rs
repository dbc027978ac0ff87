use super::{
    quote_ident, ConnectionSnafu, Dialect, DialectStrategy, PlanDecodeSnafu, QuerySnafu, Result,
};
use crate::analysis::{plan, usage};
use crate::models::{
    ForeignKey, IndexAnalysis, IndexDefinition, IndexInfo, PlanSummary, SlowQuery,
};
use async_trait::async_trait;
use snafu::ResultExt;
use sqlx::postgres::PgPoolOptions;
use sqlx::{query_scalar, Pool, Postgres, Row};
use tracing::{debug, warn};

/// PostgreSQL dialect. Reflection reads the system catalogs; plan
/// inspection uses `EXPLAIN (ANALYZE, FORMAT JSON)`; usage scoring reads
/// `pg_stat_user_indexes`.
pub struct PostgresStrategy {
    pool: Pool<Postgres>,
}

impl PostgresStrategy {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .context(ConnectionSnafu)?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn pg_stat_statements_installed(&self) -> Result<bool> {
        let query = "SELECT 1 FROM pg_extension WHERE extname = 'pg_stat_statements' LIMIT 1";
        let exists = query_scalar::<_, i32>(query)
            .fetch_optional(&self.pool)
            .await
            .context(QuerySnafu { query })?;
        Ok(exists.is_some())
    }

    async fn server_version_num(&self) -> Result<i32> {
        let query = "SELECT current_setting('server_version_num')::int";
        query_scalar::<_, i32>(query)
            .fetch_one(&self.pool)
            .await
            .context(QuerySnafu { query })
    }

    /// `pg_stat_user_indexes.last_idx_scan` only exists on 16+; older
    /// servers get a variant without it.
    async fn fetch_index_stats(&self, with_last_scan: bool) -> Result<Vec<IndexStatRow>> {
        let last_scan_column = if with_last_scan {
            "s.last_idx_scan::text"
        } else {
            "NULL::text"
        };
        let query = format!(
            r#"
            SELECT
                s.relname AS table_name,
                s.indexrelname AS index_name,
                s.idx_scan,
                {} AS last_used,
                pg_relation_size(s.indexrelid) AS size_bytes,
                pg_get_indexdef(s.indexrelid) AS definition
            FROM pg_stat_user_indexes s
            WHERE s.schemaname = current_schema()
            ORDER BY s.relname, s.indexrelname
            "#,
            last_scan_column
        );

        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .context(QuerySnafu { query })?;

        let mut stats = Vec::with_capacity(rows.len());
        for row in rows {
            stats.push(IndexStatRow {
                table_name: row.get("table_name"),
                index_name: row.get("index_name"),
                idx_scan: row.get("idx_scan"),
                last_used: row.try_get("last_used").ok().flatten(),
                size_bytes: row.get("size_bytes"),
                definition: row.get("definition"),
            });
        }
        Ok(stats)
    }
}

#[derive(Debug, Clone)]
struct IndexStatRow {
    table_name: String,
    index_name: String,
    idx_scan: i64,
    last_used: Option<String>,
    size_bytes: i64,
    definition: String,
}

#[async_trait]
impl DialectStrategy for PostgresStrategy {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let query = "SELECT tablename FROM pg_tables \
                     WHERE schemaname = current_schema() ORDER BY tablename";
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .await
            .context(QuerySnafu { query })?;
        Ok(rows.iter().map(|row| row.get("tablename")).collect())
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        let query = "SELECT column_name FROM information_schema.columns \
                     WHERE table_schema = current_schema() AND table_name = $1 \
                     ORDER BY ordinal_position";
        let rows = sqlx::query(query)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .context(QuerySnafu { query })?;
        Ok(rows.iter().map(|row| row.get("column_name")).collect())
    }

    async fn table_indexes(&self, table: &str) -> Result<Vec<IndexInfo>> {
        let query = r#"
            SELECT
                idx.relname AS index_name,
                i.indisunique AS is_unique,
                array_agg(a.attname ORDER BY arr.ord) AS columns
            FROM pg_index i
            JOIN pg_class c ON c.oid = i.indrelid
            JOIN pg_class idx ON idx.oid = i.indexrelid
            JOIN pg_namespace n ON n.oid = c.relnamespace
            JOIN LATERAL unnest(i.indkey) WITH ORDINALITY AS arr(attnum, ord)
                ON arr.attnum > 0
            JOIN pg_attribute a ON a.attrelid = c.oid AND a.attnum = arr.attnum
            WHERE n.nspname = current_schema() AND c.relname = $1
            GROUP BY idx.relname, i.indisunique
            ORDER BY idx.relname
        "#;

        let rows = sqlx::query(query)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .context(QuerySnafu { query })?;

        Ok(rows
            .iter()
            .map(|row| IndexInfo {
                name: row.get("index_name"),
                columns: row.get("columns"),
                unique: row.get("is_unique"),
            })
            .collect())
    }

    async fn table_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>> {
        let query = r#"
            SELECT
                (SELECT array_agg(a.attname ORDER BY k.ord)
                   FROM unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
                   JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
                ) AS columns,
                ref.relname AS referenced_table,
                (SELECT array_agg(a.attname ORDER BY k.ord)
                   FROM unnest(con.confkey) WITH ORDINALITY AS k(attnum, ord)
                   JOIN pg_attribute a ON a.attrelid = con.confrelid AND a.attnum = k.attnum
                ) AS referenced_columns
            FROM pg_constraint con
            JOIN pg_class c ON c.oid = con.conrelid
            JOIN pg_class ref ON ref.oid = con.confrelid
            JOIN pg_namespace n ON n.oid = c.relnamespace
            WHERE con.contype = 'f'
              AND n.nspname = current_schema()
              AND c.relname = $1
            ORDER BY con.conname
        "#;

        let rows = sqlx::query(query)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .context(QuerySnafu { query })?;

        Ok(rows
            .iter()
            .map(|row| ForeignKey {
                columns: row.get("columns"),
                referenced_table: row.get("referenced_table"),
                referenced_columns: row.get("referenced_columns"),
            })
            .collect())
    }

    async fn table_row_count(&self, table: &str) -> Result<i64> {
        let query = format!("SELECT COUNT(*) AS n FROM {}", quote_ident(table));
        let row = sqlx::query(&query)
            .fetch_one(&self.pool)
            .await
            .context(QuerySnafu { query })?;
        Ok(row.get("n"))
    }

    async fn table_size_bytes(&self, table: &str) -> Option<i64> {
        let query = "SELECT pg_total_relation_size(quote_ident($1)::regclass) AS size_bytes";
        match sqlx::query(query).bind(table).fetch_one(&self.pool).await {
            Ok(row) => row.try_get("size_bytes").ok(),
            Err(err) => {
                debug!("Failed to read size of table {}: {}", table, err);
                None
            }
        }
    }

    fn create_index_ddl(&self, def: &IndexDefinition) -> String {
        render_create_index(def)
    }

    fn drop_index_ddl(&self, name: &str, _table: &str) -> String {
        format!("DROP INDEX IF EXISTS {}", quote_ident(name))
    }

    async fn execute_ddl(&self, sql: &str) -> Result<()> {
        // Each DDL statement auto-commits on its own; bulk apply is
        // deliberately best-effort rather than all-or-nothing.
        sqlx::query(sql)
            .execute(&self.pool)
            .await
            .context(QuerySnafu { query: sql })?;
        Ok(())
    }

    async fn explain_plan(&self, sql: &str) -> Result<PlanSummary> {
        let query = format!("EXPLAIN (ANALYZE, FORMAT JSON) {}", sql);
        let row = sqlx::query(&query)
            .fetch_one(&self.pool)
            .await
            .context(QuerySnafu { query })?;

        let value: serde_json::Value = row.get(0);
        plan::parse_postgres_plan(&value).context(PlanDecodeSnafu)
    }

    async fn index_usage(&self, usage_threshold: i64) -> Result<Vec<IndexAnalysis>> {
        let version = self.server_version_num().await.unwrap_or_else(|err| {
            warn!("Failed to detect server version: {}", err);
            130000
        });

        let stats = self.fetch_index_stats(version >= 160000).await?;

        Ok(stats
            .into_iter()
            .map(|row| {
                let (columns, kind) = usage::parse_index_definition(&row.definition);
                let is_effective = row.idx_scan >= usage_threshold;
                IndexAnalysis {
                    name: row.index_name,
                    table: row.table_name,
                    columns,
                    kind,
                    size_bytes: Some(row.size_bytes),
                    usage_count: Some(row.idx_scan),
                    last_used: row.last_used,
                    is_effective: Some(is_effective),
                    notes: format!(
                        "scanned {} times (effectiveness threshold {})",
                        row.idx_scan, usage_threshold
                    ),
                }
            })
            .collect())
    }

    async fn slow_queries(&self, limit: usize) -> Result<Vec<SlowQuery>> {
        if !self.pg_stat_statements_installed().await? {
            warn!("pg_stat_statements is not installed; slow-query analysis degrades to empty");
            return Ok(Vec::new());
        }

        let version = self.server_version_num().await.unwrap_or(130000);
        let (total, mean) = if version >= 130000 {
            ("total_exec_time", "mean_exec_time")
        } else {
            ("total_time", "mean_time")
        };

        let query = format!(
            r#"
            SELECT s.query, s.calls, s.{mean} AS mean_time_ms
            FROM pg_stat_statements s
            WHERE s.dbid = (SELECT oid FROM pg_database WHERE datname = current_database())
            ORDER BY s.{total} DESC
            LIMIT $1
            "#,
        );

        let rows = sqlx::query(&query)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .context(QuerySnafu { query })?;

        Ok(rows
            .iter()
            .map(|row| SlowQuery {
                query: row.get("query"),
                calls: row.get("calls"),
                mean_time_ms: row.get("mean_time_ms"),
            })
            .collect())
    }
}

/// Renders PostgreSQL `CREATE INDEX` DDL, including the access method and
/// an optional partial-index predicate.
pub(crate) fn render_create_index(def: &IndexDefinition) -> String {
    let unique = if def.unique { "UNIQUE " } else { "" };
    let columns = def
        .columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let mut ddl = format!(
        "CREATE {}INDEX {} ON {} USING {} ({})",
        unique,
        quote_ident(&def.name),
        quote_ident(&def.table),
        def.kind.as_str(),
        columns
    );
    if let Some(predicate) = &def.predicate {
        ddl.push_str(" WHERE ");
        ddl.push_str(predicate);
    }
    ddl
}
