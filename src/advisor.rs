use crate::analysis::{baseline, plan, recommend};
use crate::config::AdvisorConfig;
use crate::dialect::{self, DialectError, DialectStrategy};
use crate::manager::IndexManager;
use crate::models::{
    ActionCounts, ApplyReport, IndexAnalysis, IndexRecommendation, IndexReport, OptimizationPlan,
    Priority, PriorityCounts, QueryAnalysis, RecommendationAction, ReportSummary, TableSchema,
    TableStatistics, ValidationDetail, ValidationReport, VerificationResult,
};
use chrono::Utc;
use snafu::{ResultExt, Snafu};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Snafu)]
pub enum AdvisorError {
    #[snafu(display("Failed to open database connection: {}", source))]
    Connect { source: DialectError },

    #[snafu(display("Failed to reflect schema: {}", source))]
    Reflect { source: DialectError },

    #[snafu(display("Failed to analyze index usage: {}", source))]
    Usage { source: DialectError },
}

type Result<T, E = AdvisorError> = std::result::Result<T, E>;

/// The engine façade: owns the dialect strategy and thresholds, exposes
/// analysis, validation, verification and baseline application.
///
/// Each operation reflects and analyzes fresh state; the advisor holds no
/// mutable state of its own between calls.
#[derive(Clone)]
pub struct IndexAdvisor {
    strategy: Arc<dyn DialectStrategy>,
    config: AdvisorConfig,
}

impl IndexAdvisor {
    /// Connects to `url` (dialect inferred from the scheme) with the
    /// given thresholds.
    pub async fn connect(url: &str, config: AdvisorConfig) -> Result<Self> {
        let strategy = dialect::connect(url).await.context(ConnectSnafu)?;
        info!("Connected to {} database", strategy.dialect().as_str());
        Ok(Self { strategy, config })
    }

    /// Wraps an already-connected strategy (a live engine handle).
    pub fn from_strategy(strategy: Arc<dyn DialectStrategy>, config: AdvisorConfig) -> Self {
        Self { strategy, config }
    }

    pub fn database_type(&self) -> &'static str {
        self.strategy.dialect().as_str()
    }

    pub fn manager(&self) -> IndexManager {
        IndexManager::new(Arc::clone(&self.strategy))
    }

    /// Reflects the current schema state, skipping unreflectable tables.
    pub async fn reflect(&self) -> Result<Vec<TableSchema>> {
        dialect::reflect_schema(self.strategy.as_ref())
            .await
            .context(ReflectSnafu)
    }

    /// Scores every existing index for effectiveness.
    pub async fn analyze_usage(&self) -> Result<Vec<IndexAnalysis>> {
        self.strategy
            .index_usage(self.config.usage_threshold)
            .await
            .context(UsageSnafu)
    }

    /// Plan analysis of one arbitrary SQL query, with candidate indexes
    /// attached when the plan fell back to full scans.
    pub async fn analyze_query(&self, sql: &str) -> QueryAnalysis {
        let schema = match self.reflect().await {
            Ok(schema) => schema,
            Err(err) => {
                warn!("Reflection failed during query analysis: {}", err);
                Vec::new()
            }
        };
        plan::analyze_query(self.strategy.as_ref(), &schema, sql).await
    }

    /// Full recommendation set for the current schema state.
    pub async fn recommend_indexes(&self) -> Result<Vec<IndexRecommendation>> {
        let schema = self.reflect().await?;
        Ok(recommend::recommend_indexes(self.strategy.as_ref(), &self.config, &schema).await)
    }

    /// Assembles the full report: table statistics, usage analysis,
    /// recommendations and summary. Per-analyzer failures leave gaps
    /// rather than failing the report.
    pub async fn generate_index_report(&self) -> Result<IndexReport> {
        info!("Reflecting schema...");
        let schema = self.reflect().await?;

        info!("Running index usage analysis...");
        let index_statistics = match self.analyze_usage().await {
            Ok(statistics) => statistics,
            Err(err) => {
                warn!("Usage analysis unavailable, reporting without it: {}", err);
                Vec::new()
            }
        };

        info!("Building recommendations...");
        let recommendations =
            recommend::recommend_indexes(self.strategy.as_ref(), &self.config, &schema).await;

        let table_statistics: Vec<TableStatistics> = schema
            .iter()
            .map(|table| TableStatistics {
                table: table.name.clone(),
                row_count: table.row_count,
                column_count: table.columns.len(),
                size_bytes: table.size_bytes,
            })
            .collect();
        let indexes_count = schema.iter().map(|table| table.indexes.len()).sum();
        let summary = build_summary(&index_statistics, &recommendations);

        Ok(IndexReport {
            generated_at: now_iso8601(),
            database_type: self.database_type().to_string(),
            tables_count: schema.len(),
            indexes_count,
            table_statistics,
            index_statistics,
            recommendations,
            summary,
        })
    }

    /// Narrow validation report: used/unused counts with a removal
    /// suggestion attached to each unused index.
    pub async fn generate_validation_report(&self) -> Result<ValidationReport> {
        let analyses = self.analyze_usage().await?;

        let mut used = 0usize;
        let mut unused = 0usize;
        let mut unknown = 0usize;
        let details: Vec<ValidationDetail> = analyses
            .into_iter()
            .map(|analysis| {
                let suggestion = match analysis.is_effective {
                    Some(true) => {
                        used += 1;
                        None
                    }
                    Some(false) => {
                        unused += 1;
                        Some(format!(
                            "consider removing index '{}' from table '{}'",
                            analysis.name, analysis.table
                        ))
                    }
                    None => {
                        unknown += 1;
                        None
                    }
                };
                ValidationDetail {
                    index_name: analysis.name,
                    table: analysis.table,
                    is_effective: analysis.is_effective,
                    notes: analysis.notes,
                    suggestion,
                }
            })
            .collect();

        Ok(ValidationReport {
            generated_at: now_iso8601(),
            database_type: self.database_type().to_string(),
            indexes_validated: used + unused,
            indexes_used: used,
            indexes_unused: unused,
            indexes_unknown: unknown,
            details,
        })
    }

    /// Checks whether `index_name` serves `query` according to the
    /// planner. Failures yield `is_used == false` with the cause in the
    /// explanation, never an error.
    pub async fn verify_index_usage(&self, index_name: &str, query: &str) -> VerificationResult {
        match self.strategy.explain_plan(query).await {
            Ok(summary) => {
                let is_used = plan::plan_mentions_index(&summary, index_name);
                let explanation = if is_used {
                    format!("the query planner selects index '{}' for this query", index_name)
                } else {
                    format!("the execution plan does not reference index '{}'", index_name)
                };
                VerificationResult {
                    index_name: index_name.to_string(),
                    query: query.to_string(),
                    is_used,
                    execution_plan: summary.execution_plan,
                    explanation,
                }
            }
            Err(err) => VerificationResult {
                index_name: index_name.to_string(),
                query: query.to_string(),
                is_used: false,
                execution_plan: String::new(),
                explanation: format!("plan analysis failed: {}", err),
            },
        }
    }

    /// Applies the curated baseline index set (skip present, create
    /// missing, tally failures). This is the known-good-defaults fast
    /// path, distinct from the dynamic recommendation engine.
    pub async fn create_recommended_indexes(&self) -> ApplyReport {
        baseline::apply_baseline(&self.manager()).await
    }

    /// Prioritized optimization plan. Application is left to the operator;
    /// nothing is executed.
    pub async fn generate_optimization_plan(&self) -> Result<OptimizationPlan> {
        let recommendations = self.recommend_indexes().await?;
        let (by_priority, by_action) = count_recommendations(&recommendations);
        Ok(OptimizationPlan {
            generated_at: now_iso8601(),
            database_type: self.database_type().to_string(),
            recommendations,
            recommendations_by_priority: by_priority,
            recommendations_by_action: by_action,
        })
    }
}

fn now_iso8601() -> String {
    Utc::now().to_rfc3339()
}

fn count_recommendations(
    recommendations: &[IndexRecommendation],
) -> (PriorityCounts, ActionCounts) {
    let mut by_priority = PriorityCounts::default();
    let mut by_action = ActionCounts::default();
    for rec in recommendations {
        match rec.priority {
            Priority::High => by_priority.high += 1,
            Priority::Medium => by_priority.medium += 1,
            Priority::Low => by_priority.low += 1,
        }
        match rec.action {
            RecommendationAction::Create => by_action.create += 1,
            RecommendationAction::Remove => by_action.remove += 1,
            RecommendationAction::Modify => by_action.modify += 1,
        }
    }
    (by_priority, by_action)
}

fn build_summary(
    statistics: &[IndexAnalysis],
    recommendations: &[IndexRecommendation],
) -> ReportSummary {
    let (by_priority, by_action) = count_recommendations(recommendations);
    ReportSummary {
        total_indexes: statistics.len(),
        ineffective_indexes: statistics
            .iter()
            .filter(|a| a.is_effective == Some(false))
            .count(),
        recommendations_total: recommendations.len(),
        recommendations_by_priority: by_priority,
        recommendations_by_action: by_action,
    }
}

/// A database the free functions can operate on: either a connection URL
/// or an already-connected engine handle.
pub enum DbTarget {
    Url(String),
    Handle(Arc<dyn DialectStrategy>),
}

impl From<&str> for DbTarget {
    fn from(url: &str) -> Self {
        DbTarget::Url(url.to_string())
    }
}

impl From<String> for DbTarget {
    fn from(url: String) -> Self {
        DbTarget::Url(url)
    }
}

impl From<Arc<dyn DialectStrategy>> for DbTarget {
    fn from(strategy: Arc<dyn DialectStrategy>) -> Self {
        DbTarget::Handle(strategy)
    }
}

impl DbTarget {
    async fn into_advisor(self, config: AdvisorConfig) -> Result<IndexAdvisor> {
        match self {
            DbTarget::Url(url) => IndexAdvisor::connect(&url, config).await,
            DbTarget::Handle(strategy) => Ok(IndexAdvisor::from_strategy(strategy, config)),
        }
    }
}

/// Generates the full index report for `target`. This and the functions
/// below are the integration surface external collaborators use.
pub async fn analyze_database_indexes(target: impl Into<DbTarget>) -> Result<IndexReport> {
    let advisor = target.into().into_advisor(AdvisorConfig::default()).await?;
    advisor.generate_index_report().await
}

/// Generates the narrow validation report for `target`.
pub async fn validate_database_indexes(target: impl Into<DbTarget>) -> Result<ValidationReport> {
    let advisor = target.into().into_advisor(AdvisorConfig::default()).await?;
    advisor.generate_validation_report().await
}

/// Builds the prioritized optimization plan for `target`.
pub async fn optimize_database_indexes(target: impl Into<DbTarget>) -> Result<OptimizationPlan> {
    let advisor = target.into().into_advisor(AdvisorConfig::default()).await?;
    advisor.generate_optimization_plan().await
}

/// Hands out a lifecycle manager for `target`.
pub async fn get_index_manager(target: impl Into<DbTarget>) -> Result<IndexManager> {
    let advisor = target.into().into_advisor(AdvisorConfig::default()).await?;
    Ok(advisor.manager())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IndexDefinition;

    #[test]
    fn summary_counts_group_by_priority_and_action() {
        let def = IndexDefinition::new("posts", &["user_id"], false).unwrap();
        let recommendations = vec![
            IndexRecommendation::create(def, "fk".into(), Priority::High),
            IndexRecommendation::remove("idx_old", "unused".into(), Priority::Medium),
        ];

        let summary = build_summary(&[], &recommendations);
        assert_eq!(summary.recommendations_total, 2);
        assert_eq!(summary.recommendations_by_priority.high, 1);
        assert_eq!(summary.recommendations_by_priority.medium, 1);
        assert_eq!(summary.recommendations_by_action.create, 1);
        assert_eq!(summary.recommendations_by_action.remove, 1);
    }
}
