use super::{quote_ident, ConnectionSnafu, Dialect, DialectStrategy, QuerySnafu, Result};
use crate::analysis::plan;
use crate::models::{
    ForeignKey, IndexAnalysis, IndexDefinition, IndexInfo, IndexKind, PlanSummary, SlowQuery,
};
use async_trait::async_trait;
use snafu::ResultExt;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Row, Sqlite};
use std::collections::BTreeMap;
use tracing::debug;

/// SQLite dialect. Reflection goes through the PRAGMA table-valued
/// functions; plan inspection uses `EXPLAIN QUERY PLAN` text output.
///
/// A single pooled connection is used so that in-memory databases keep
/// their schema across calls.
pub struct SqliteStrategy {
    pool: Pool<Sqlite>,
}

impl SqliteStrategy {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await
            .context(ConnectionSnafu)?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    async fn index_columns(&self, index: &str) -> Result<Vec<String>> {
        let query = format!("PRAGMA index_info({})", quote_ident(index));
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .context(QuerySnafu { query })?;

        // `name` is NULL for rowid or expression members; skip those.
        Ok(rows
            .iter()
            .filter_map(|row| row.try_get::<Option<String>, _>("name").ok().flatten())
            .collect())
    }
}

#[async_trait]
impl DialectStrategy for SqliteStrategy {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let query = "SELECT name FROM sqlite_master \
                     WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
                     ORDER BY name";
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .await
            .context(QuerySnafu { query })?;
        Ok(rows.iter().map(|row| row.get("name")).collect())
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        let query = format!("PRAGMA table_info({})", quote_ident(table));
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .context(QuerySnafu { query })?;
        Ok(rows.iter().map(|row| row.get("name")).collect())
    }

    async fn table_indexes(&self, table: &str) -> Result<Vec<IndexInfo>> {
        let query = format!("PRAGMA index_list({})", quote_ident(table));
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .context(QuerySnafu { query })?;

        let mut indexes = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: String = row.get("name");
            let unique: i64 = row.get("unique");
            let columns = self.index_columns(&name).await?;
            if columns.is_empty() {
                continue;
            }
            indexes.push(IndexInfo {
                name,
                columns,
                unique: unique != 0,
            });
        }
        Ok(indexes)
    }

    async fn table_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>> {
        let query = format!("PRAGMA foreign_key_list({})", quote_ident(table));
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .context(QuerySnafu { query })?;

        // Rows of one composite foreign key share an `id`; `seq` orders the
        // column pairs within it.
        let mut grouped: BTreeMap<i64, ForeignKey> = BTreeMap::new();
        for row in &rows {
            let id: i64 = row.get("id");
            let local: String = row.get("from");
            let referenced_table: String = row.get("table");
            let referenced: Option<String> = row.try_get("to").ok().flatten();

            let entry = grouped.entry(id).or_insert_with(|| ForeignKey {
                columns: Vec::new(),
                referenced_table,
                referenced_columns: Vec::new(),
            });
            entry.columns.push(local);
            if let Some(referenced) = referenced {
                entry.referenced_columns.push(referenced);
            }
        }
        Ok(grouped.into_values().collect())
    }

    async fn table_row_count(&self, table: &str) -> Result<i64> {
        let query = format!("SELECT COUNT(*) AS n FROM {}", quote_ident(table));
        let row = sqlx::query(&query)
            .fetch_one(&self.pool)
            .await
            .context(QuerySnafu { query })?;
        Ok(row.get("n"))
    }

    async fn table_size_bytes(&self, _table: &str) -> Option<i64> {
        // Per-table sizes need the dbstat virtual table, which is a
        // compile-time option; report "unavailable" instead of guessing.
        None
    }

    fn create_index_ddl(&self, def: &IndexDefinition) -> String {
        render_create_index(def)
    }

    fn drop_index_ddl(&self, name: &str, _table: &str) -> String {
        format!("DROP INDEX IF EXISTS {}", quote_ident(name))
    }

    async fn execute_ddl(&self, sql: &str) -> Result<()> {
        sqlx::query(sql)
            .execute(&self.pool)
            .await
            .context(QuerySnafu { query: sql })?;
        Ok(())
    }

    async fn explain_plan(&self, sql: &str) -> Result<PlanSummary> {
        let query = format!("EXPLAIN QUERY PLAN {}", sql);
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .context(QuerySnafu { query })?;

        let lines: Vec<String> = rows.iter().map(|row| row.get("detail")).collect();
        Ok(plan::parse_sqlite_plan(&lines))
    }

    async fn index_usage(&self, _usage_threshold: i64) -> Result<Vec<IndexAnalysis>> {
        // SQLite keeps no usage counters, so this asks the planner whether
        // it would pick each index for an equality probe on its leading
        // column. That measures plannability, not historical usage.
        let mut analyses = Vec::new();
        for table in self.list_tables().await? {
            for index in self.table_indexes(&table).await? {
                // Autoindexes back UNIQUE/PRIMARY KEY constraints and
                // cannot be dropped with DROP INDEX; they stay visible to
                // reflection but are not advisory targets.
                if index.name.starts_with("sqlite_autoindex_") {
                    continue;
                }
                let probe = probe_query(&table, &index.columns[0]);
                let (is_effective, notes) = match self.explain_plan(&probe).await {
                    Ok(summary) => {
                        let chosen = plan::plan_mentions_index(&summary, &index.name);
                        let verdict = if chosen { "selects" } else { "ignores" };
                        (
                            Some(chosen),
                            format!(
                                "planner {} this index for an equality probe on '{}' \
                                 (plannability check, not usage history)",
                                verdict, index.columns[0]
                            ),
                        )
                    }
                    Err(err) => {
                        debug!("Probe for index {} failed: {}", index.name, err);
                        (None, format!("plannability probe failed: {}", err))
                    }
                };

                analyses.push(IndexAnalysis {
                    name: index.name,
                    table: table.clone(),
                    columns: index.columns,
                    kind: IndexKind::Btree,
                    size_bytes: None,
                    usage_count: None,
                    last_used: None,
                    is_effective,
                    notes,
                });
            }
        }
        Ok(analyses)
    }

    async fn slow_queries(&self, _limit: usize) -> Result<Vec<SlowQuery>> {
        // No native statement statistics exist; callers may supply
        // representative queries through the plan analyzer instead.
        debug!("SQLite has no slow-query statistics source; returning empty list");
        Ok(Vec::new())
    }
}

/// SQLite ignores access methods and (by policy here) partial predicates;
/// only uniqueness survives into the DDL.
pub(crate) fn render_create_index(def: &IndexDefinition) -> String {
    let unique = if def.unique { "UNIQUE " } else { "" };
    let columns = def
        .columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE {}INDEX {} ON {} ({})",
        unique,
        quote_ident(&def.name),
        quote_ident(&def.table),
        columns
    )
}

fn probe_query(table: &str, column: &str) -> String {
    format!(
        "SELECT * FROM {} WHERE {} = '0'",
        quote_ident(table),
        quote_ident(column)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_unique_index_ddl() {
        let def = IndexDefinition::new("users", &["email"], true).unwrap();
        assert_eq!(
            render_create_index(&def),
            "CREATE UNIQUE INDEX \"unq_users_email\" ON \"users\" (\"email\")"
        );
    }

    #[test]
    fn renders_composite_index_ddl() {
        let def = IndexDefinition::new("executions", &["test_case_id", "status"], false).unwrap();
        assert_eq!(
            render_create_index(&def),
            "CREATE INDEX \"idx_executions_test_case_id_status\" ON \"executions\" \
             (\"test_case_id\", \"status\")"
        );
    }

    #[test]
    fn probe_targets_leading_column() {
        assert_eq!(
            probe_query("users", "email"),
            "SELECT * FROM \"users\" WHERE \"email\" = '0'"
        );
    }
}
