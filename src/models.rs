use serde::{Deserialize, Serialize};
use snafu::Snafu;

/// Identifier length limit shared by both supported engines (PostgreSQL
/// truncates at 63 bytes; SQLite has no hard limit but we keep derived
/// names portable).
pub const MAX_IDENTIFIER_LEN: usize = 63;

#[derive(Debug, Snafu)]
pub enum DefinitionError {
    #[snafu(display("index definition for table '{}' has an empty column list", table))]
    EmptyColumns { table: String },
}

/// Access method for an index. Non-btree kinds only apply to PostgreSQL;
/// SQLite silently uses its single btree implementation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    #[default]
    Btree,
    Hash,
    Gin,
    Gist,
    Brin,
}

impl IndexKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexKind::Btree => "btree",
            IndexKind::Hash => "hash",
            IndexKind::Gin => "gin",
            IndexKind::Gist => "gist",
            IndexKind::Brin => "brin",
        }
    }

    /// Parses an access method name as found in index DDL. Unknown methods
    /// fall back to btree.
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "hash" => IndexKind::Hash,
            "gin" => IndexKind::Gin,
            "gist" => IndexKind::Gist,
            "brin" => IndexKind::Brin,
            _ => IndexKind::Btree,
        }
    }
}

/// A fully-resolved description of a desired index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub table: String,
    /// Column order is significant: composite index column order drives
    /// plan matching.
    pub columns: Vec<String>,
    pub name: String,
    pub kind: IndexKind,
    pub unique: bool,
    /// Partial-index predicate; rendered on PostgreSQL only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicate: Option<String>,
}

impl IndexDefinition {
    /// Builds a definition with a deterministically derived name. The
    /// derivation is a pure function of (table, columns, uniqueness), so
    /// repeated construction with the same inputs yields the same name and
    /// idempotent re-creation can detect "already exists".
    pub fn new(table: &str, columns: &[&str], unique: bool) -> Result<Self, DefinitionError> {
        if columns.is_empty() {
            return EmptyColumnsSnafu { table }.fail();
        }
        let columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        let name = derive_index_name(table, &columns, unique);
        Ok(Self {
            table: table.to_string(),
            columns,
            name,
            kind: IndexKind::Btree,
            unique,
            predicate: None,
        })
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_kind(mut self, kind: IndexKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_predicate(mut self, predicate: &str) -> Self {
        self.predicate = Some(predicate.to_string());
        self
    }
}

/// Derives `{unq|idx}_{table}_{col1}_{col2}...`. When the result would
/// exceed [`MAX_IDENTIFIER_LEN`] the tail is replaced with a crc32 of the
/// full untruncated name, so similarly-prefixed long names cannot collide.
pub fn derive_index_name(table: &str, columns: &[String], unique: bool) -> String {
    let prefix = if unique { "unq" } else { "idx" };
    let name = format!("{}_{}_{}", prefix, table, columns.join("_"));
    if name.len() <= MAX_IDENTIFIER_LEN {
        return name;
    }

    let digest = crc32fast::hash(name.as_bytes());
    let keep = MAX_IDENTIFIER_LEN - 9; // room for '_' + 8 hex digits
    let mut stem = String::with_capacity(keep);
    for ch in name.chars() {
        if stem.len() + ch.len_utf8() > keep {
            break;
        }
        stem.push(ch);
    }
    format!("{}_{:08x}", stem, digest)
}

/// Read-only snapshot of one existing index, produced fresh on every
/// analysis pass. `is_effective` is tri-state: `None` means the engine
/// could not determine usage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexAnalysis {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    pub kind: IndexKind,
    pub size_bytes: Option<i64>,
    pub usage_count: Option<i64>,
    pub last_used: Option<String>,
    pub is_effective: Option<bool>,
    pub notes: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationAction {
    Create,
    Remove,
    Modify,
}

impl RecommendationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationAction::Create => "create",
            RecommendationAction::Remove => "remove",
            RecommendationAction::Modify => "modify",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "HIGH",
            Priority::Medium => "MEDIUM",
            Priority::Low => "LOW",
        }
    }
}

/// One proposed action against the schema. Exactly one of
/// `index_definition` (create) and `existing_index_name` (remove/modify)
/// is populated, matching the action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRecommendation {
    pub action: RecommendationAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_definition: Option<IndexDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_index_name: Option<String>,
    pub rationale: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_impact: Option<String>,
    pub priority: Priority,
}

impl IndexRecommendation {
    pub fn create(definition: IndexDefinition, rationale: String, priority: Priority) -> Self {
        Self {
            action: RecommendationAction::Create,
            index_definition: Some(definition),
            existing_index_name: None,
            rationale,
            estimated_impact: None,
            priority,
        }
    }

    pub fn remove(index_name: &str, rationale: String, priority: Priority) -> Self {
        Self {
            action: RecommendationAction::Remove,
            index_definition: None,
            existing_index_name: Some(index_name.to_string()),
            rationale,
            estimated_impact: None,
            priority,
        }
    }

    pub fn with_impact(mut self, impact: &str) -> Self {
        self.estimated_impact = Some(impact.to_string());
        self
    }

    /// Deduplication key: index name for creates, existing index name for
    /// removes and modifies.
    pub fn dedup_key(&self) -> String {
        match (&self.index_definition, &self.existing_index_name) {
            (Some(def), _) => format!("{:?}:{}", self.action, def.name),
            (None, Some(name)) => format!("{:?}:{}", self.action, name),
            (None, None) => format!("{:?}:", self.action),
        }
    }
}

/// Reflected metadata for one existing index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

/// Reflected foreign key: local columns referencing another table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKey {
    pub columns: Vec<String>,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
}

/// One table's reflected schema state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<String>,
    pub indexes: Vec<IndexInfo>,
    pub foreign_keys: Vec<ForeignKey>,
    pub row_count: i64,
    pub size_bytes: Option<i64>,
}

/// A slow or representative query with its observed call statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlowQuery {
    pub query: String,
    pub calls: i64,
    pub mean_time_ms: f64,
}

/// Dialect-neutral summary of an explain-plan run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanSummary {
    pub execution_plan: String,
    pub indexes_used: Vec<String>,
    /// Tables hit by a full scan with no index assist.
    pub tables_scanned: Vec<String>,
}

/// Result of analyzing a single query's plan. Analysis failures are
/// recorded under `error` rather than propagated, so aggregate reports
/// tolerate per-query gaps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryAnalysis {
    pub execution_plan: String,
    pub indexes_used: Vec<String>,
    pub tables_scanned: Vec<String>,
    pub recommendations: Vec<IndexRecommendation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of verifying whether a specific index serves a specific query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub index_name: String,
    pub query: String,
    pub is_used: bool,
    pub execution_plan: String,
    pub explanation: String,
}

/// Per-table statistics included in the full report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableStatistics {
    pub table: String,
    pub row_count: i64,
    pub column_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PriorityCounts {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ActionCounts {
    pub create: usize,
    pub remove: usize,
    pub modify: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_indexes: usize,
    pub ineffective_indexes: usize,
    pub recommendations_total: usize,
    pub recommendations_by_priority: PriorityCounts,
    pub recommendations_by_action: ActionCounts,
}

/// Full index report. Field names are the serialization contract consumed
/// by external collaborators, so renaming them is a breaking change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexReport {
    pub generated_at: String,
    pub database_type: String,
    pub tables_count: usize,
    pub indexes_count: usize,
    pub table_statistics: Vec<TableStatistics>,
    pub index_statistics: Vec<IndexAnalysis>,
    pub recommendations: Vec<IndexRecommendation>,
    pub summary: ReportSummary,
}

/// Per-index entry in the validation report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationDetail {
    pub index_name: String,
    pub table: String,
    pub is_effective: Option<bool>,
    pub notes: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// Narrow validation report: `indexes_validated` counts only indexes with
/// a definite verdict, so `indexes_validated == indexes_used +
/// indexes_unused` holds for any schema state; indeterminate indexes are
/// tallied separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub generated_at: String,
    pub database_type: String,
    pub indexes_validated: usize,
    pub indexes_used: usize,
    pub indexes_unused: usize,
    pub indexes_unknown: usize,
    pub details: Vec<ValidationDetail>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyStatus {
    Created,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyDetail {
    pub index_name: String,
    pub table: String,
    pub status: ApplyStatus,
}

/// Outcome of applying the curated baseline index set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplyReport {
    pub success_count: usize,
    pub failed_count: usize,
    pub skipped_count: usize,
    pub details: Vec<ApplyDetail>,
}

/// Prioritized optimization plan produced by the recommendation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationPlan {
    pub generated_at: String,
    pub database_type: String,
    pub recommendations: Vec<IndexRecommendation>,
    pub recommendations_by_priority: PriorityCounts,
    pub recommendations_by_action: ActionCounts,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn derived_names_are_deterministic() {
        let first = IndexDefinition::new("users", &["email"], true).unwrap();
        let second = IndexDefinition::new("users", &["email"], true).unwrap();
        assert_eq!(first.name, second.name);
        assert_eq!(first.name, "unq_users_email");
    }

    #[rstest]
    #[case("users", &["email"], false, "idx_users_email")]
    #[case("posts", &["user_id", "created_at"], false, "idx_posts_user_id_created_at")]
    #[case("users", &["email"], true, "unq_users_email")]
    fn derived_names_follow_convention(
        #[case] table: &str,
        #[case] columns: &[&str],
        #[case] unique: bool,
        #[case] expected: &str,
    ) {
        let def = IndexDefinition::new(table, columns, unique).unwrap();
        assert_eq!(def.name, expected);
    }

    #[test]
    fn long_names_fall_back_to_hash_suffix() {
        let table = "extremely_long_table_name_for_the_execution_history_subsystem";
        let def = IndexDefinition::new(table, &["first_column", "second_column"], false).unwrap();
        assert!(def.name.len() <= MAX_IDENTIFIER_LEN);

        // Same inputs, same hash.
        let again = IndexDefinition::new(table, &["first_column", "second_column"], false).unwrap();
        assert_eq!(def.name, again.name);

        // A sibling sharing the long prefix must not collide.
        let sibling =
            IndexDefinition::new(table, &["first_column", "second_column2"], false).unwrap();
        assert!(sibling.name.len() <= MAX_IDENTIFIER_LEN);
        assert_ne!(def.name, sibling.name);
    }

    #[test]
    fn empty_column_list_is_a_construction_error() {
        let err = IndexDefinition::new("users", &[], false).unwrap_err();
        assert!(err.to_string().contains("users"));
    }

    #[test]
    fn recommendation_dedup_key_distinguishes_actions() {
        let def = IndexDefinition::new("posts", &["user_id"], false).unwrap();
        let create = IndexRecommendation::create(def, "covering".into(), Priority::High);
        let remove =
            IndexRecommendation::remove("idx_posts_user_id", "unused".into(), Priority::Medium);
        assert_ne!(create.dedup_key(), remove.dedup_key());
    }

    #[test]
    fn reports_are_serializable() {
        let report = IndexReport {
            generated_at: "2026-01-01T00:00:00Z".into(),
            database_type: "sqlite".into(),
            tables_count: 1,
            indexes_count: 0,
            table_statistics: vec![TableStatistics {
                table: "users".into(),
                row_count: 3,
                column_count: 4,
                size_bytes: None,
            }],
            index_statistics: vec![],
            recommendations: vec![],
            summary: ReportSummary::default(),
        };

        let json = serde_json::to_value(&report).expect("report should serialize");
        assert_eq!(json["database_type"], "sqlite");
        assert_eq!(json["table_statistics"][0]["row_count"], 3);
        assert!(json["table_statistics"][0].get("size_bytes").is_none());
    }
}
