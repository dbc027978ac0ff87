//! Recommendation engine: aggregates ineffective-index removals,
//! missing-index creations derived from slow queries, and un-indexed
//! foreign keys into one deduplicated, prioritized set.

use crate::analysis::plan;
use crate::config::AdvisorConfig;
use crate::dialect::DialectStrategy;
use crate::models::{
    ForeignKey, IndexDefinition, IndexRecommendation, Priority, TableSchema,
};
use itertools::Itertools;
use tracing::{debug, warn};

/// Builds the full recommendation set for the reflected `schema`.
///
/// Analyzer failures degrade to warnings; the engine always returns
/// whatever it could derive. Output order follows generation order
/// (removals, slow-query candidates, foreign keys) but is otherwise not
/// guaranteed.
pub async fn recommend_indexes(
    strategy: &dyn DialectStrategy,
    config: &AdvisorConfig,
    schema: &[TableSchema],
) -> Vec<IndexRecommendation> {
    let mut recommendations = Vec::new();

    // 1. Ineffective indexes become removal candidates.
    match strategy.index_usage(config.usage_threshold).await {
        Ok(analyses) => {
            for analysis in analyses {
                if analysis.is_effective == Some(false) {
                    recommendations.push(
                        IndexRecommendation::remove(
                            &analysis.name,
                            format!(
                                "index '{}' on table '{}' is not effectively used",
                                analysis.name, analysis.table
                            ),
                            Priority::Medium,
                        )
                        .with_impact("reduces write overhead and reclaims storage"),
                    );
                }
            }
        }
        Err(err) => warn!("Usage analysis skipped: {}", err),
    }

    // 2. Candidates derived from slow/representative queries.
    match strategy.slow_queries(config.slow_query_limit).await {
        Ok(slow_queries) => {
            debug!("Analyzing {} slow queries", slow_queries.len());
            for slow in slow_queries {
                let analysis = plan::analyze_query(strategy, schema, &slow.query).await;
                if let Some(error) = &analysis.error {
                    debug!("Skipping unanalyzable slow query: {}", error);
                    continue;
                }
                let priority = if slow.calls > config.high_priority_calls {
                    Priority::High
                } else {
                    Priority::Medium
                };
                for mut candidate in analysis.recommendations {
                    let Some(def) = candidate.index_definition.as_ref() else {
                        continue;
                    };
                    if index_name_exists(schema, &def.name)
                        || candidate_covered(schema, &def.table, &def.columns)
                    {
                        continue;
                    }
                    candidate.priority = priority;
                    candidate.rationale = format!(
                        "{} (observed {} calls, mean {:.1} ms)",
                        candidate.rationale, slow.calls, slow.mean_time_ms
                    );
                    recommendations.push(candidate);
                }
            }
        }
        Err(err) => warn!("Slow-query analysis skipped: {}", err),
    }

    // 3. Foreign keys without a covering index are near-mandatory creates.
    for table in schema {
        for fk in &table.foreign_keys {
            if fk.columns.is_empty() || covers_foreign_key(table, fk) {
                continue;
            }
            let columns: Vec<&str> = fk.columns.iter().map(String::as_str).collect();
            let Ok(definition) = IndexDefinition::new(&table.name, &columns, false) else {
                continue;
            };
            recommendations.push(
                IndexRecommendation::create(
                    definition,
                    format!(
                        "foreign key on {}.{} referencing '{}' has no covering index",
                        table.name,
                        fk.columns.join(", "),
                        fk.referenced_table
                    ),
                    Priority::High,
                )
                .with_impact("speeds up joins and referential actions on the parent table"),
            );
        }
    }

    dedup_first_wins(recommendations)
}

/// Whether any existing index on `table` covers all the foreign key's
/// columns. The check is order-insensitive: the FK columns just have to be
/// present in the index's column set.
pub fn covers_foreign_key(table: &TableSchema, fk: &ForeignKey) -> bool {
    table.indexes.iter().any(|index| {
        fk.columns.iter().all(|fk_col| {
            index
                .columns
                .iter()
                .any(|idx_col| idx_col.eq_ignore_ascii_case(fk_col))
        })
    })
}

/// Whether an existing index already serves `columns` as a leading prefix,
/// making a new index on them redundant.
pub fn candidate_covered(schema: &[TableSchema], table: &str, columns: &[String]) -> bool {
    let Some(table) = schema.iter().find(|t| t.name.eq_ignore_ascii_case(table)) else {
        return false;
    };
    table.indexes.iter().any(|index| {
        index.columns.len() >= columns.len()
            && index
                .columns
                .iter()
                .zip(columns)
                .all(|(idx_col, col)| idx_col.eq_ignore_ascii_case(col))
    })
}

fn index_name_exists(schema: &[TableSchema], name: &str) -> bool {
    schema
        .iter()
        .flat_map(|t| &t.indexes)
        .any(|index| index.name.eq_ignore_ascii_case(name))
}

/// Deduplicates by index name (creates) or existing-index name (removes
/// and modifies); the first occurrence wins.
pub fn dedup_first_wins(recommendations: Vec<IndexRecommendation>) -> Vec<IndexRecommendation> {
    recommendations
        .into_iter()
        .unique_by(|rec| rec.dedup_key())
        .collect()
}
