use crate::dialect::DialectStrategy;
use crate::models::IndexDefinition;
use std::sync::Arc;
use tracing::{debug, warn};

/// Index lifecycle operations against the live schema.
///
/// All operations return booleans rather than errors: bulk callers
/// applying a recommendation set must continue past individual failures,
/// so failures are logged and converted at this boundary. Existence checks
/// are advisory only; concurrent creators of the same index name rely on
/// the engine's own DDL locking.
#[derive(Clone)]
pub struct IndexManager {
    strategy: Arc<dyn DialectStrategy>,
}

impl IndexManager {
    pub fn new(strategy: Arc<dyn DialectStrategy>) -> Self {
        Self { strategy }
    }

    /// Creates the index described by `def`. Returns `false` on failure
    /// (nonexistent table, duplicate name, permissions), logging the
    /// cause. Callers wanting skip-not-error semantics for existing names
    /// should query [`IndexManager::check_index_exists`] first; the
    /// manager itself does not deduplicate.
    pub async fn create_index(&self, def: &IndexDefinition) -> bool {
        let ddl = self.strategy.create_index_ddl(def);
        match self.strategy.execute_ddl(&ddl).await {
            Ok(()) => {
                debug!("Created index {} on table {}", def.name, def.table);
                true
            }
            Err(err) => {
                warn!("Failed to create index {}: {}", def.name, err);
                false
            }
        }
    }

    /// Drops an index with `IF EXISTS` semantics: removing a nonexistent
    /// index is a success, not an error.
    pub async fn remove_index(&self, name: &str, table: &str) -> bool {
        let ddl = self.strategy.drop_index_ddl(name, table);
        match self.strategy.execute_ddl(&ddl).await {
            Ok(()) => {
                debug!("Dropped index {} (table {})", name, table);
                true
            }
            Err(err) => {
                warn!("Failed to drop index {}: {}", name, err);
                false
            }
        }
    }

    /// Whether an index named `name` exists, on `table` when given, else
    /// anywhere in the schema. Reflection failures count as "not found".
    pub async fn check_index_exists(&self, name: &str, table: Option<&str>) -> bool {
        let tables = match table {
            Some(table) => vec![table.to_string()],
            None => match self.strategy.list_tables().await {
                Ok(tables) => tables,
                Err(err) => {
                    warn!("Failed to list tables for existence check: {}", err);
                    return false;
                }
            },
        };

        for table in tables {
            match self.strategy.table_indexes(&table).await {
                Ok(indexes) => {
                    if indexes.iter().any(|i| i.name.eq_ignore_ascii_case(name)) {
                        return true;
                    }
                }
                Err(err) => {
                    debug!("Could not inspect indexes of {}: {}", table, err);
                }
            }
        }
        false
    }
}
