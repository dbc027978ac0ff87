//! Explain-plan normalization and query analysis.
//!
//! PostgreSQL plans arrive as a JSON tree and are walked through a typed
//! node; SQLite plans arrive as `EXPLAIN QUERY PLAN` detail lines and are
//! matched on their `SCAN` / `USING INDEX` markers. Both normalize into
//! [`PlanSummary`]; when a plan scanned tables without touching an index,
//! the predicate extractor proposes single-column candidate indexes.

use crate::analysis::predicates::{self, ConditionKind, FilterCondition};
use crate::dialect::DialectStrategy;
use crate::models::{
    IndexDefinition, IndexRecommendation, PlanSummary, Priority, QueryAnalysis, TableSchema,
};
use serde::Deserialize;
use tracing::debug;

/// One node of a PostgreSQL JSON explain plan. Sub-plans nest under
/// `Plans`; the visitor below walks them recursively.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanNode {
    #[serde(rename = "Node Type")]
    pub node_type: String,
    #[serde(rename = "Relation Name")]
    pub relation_name: Option<String>,
    #[serde(rename = "Index Name")]
    pub index_name: Option<String>,
    #[serde(rename = "Plans", default)]
    pub children: Vec<PlanNode>,
}

#[derive(Debug, Deserialize)]
struct ExplainRoot {
    #[serde(rename = "Plan")]
    plan: PlanNode,
}

/// Normalizes the JSON value produced by `EXPLAIN (FORMAT JSON)`.
pub fn parse_postgres_plan(value: &serde_json::Value) -> Result<PlanSummary, serde_json::Error> {
    let roots: Vec<ExplainRoot> = serde_json::from_value(value.clone())?;

    let mut summary = PlanSummary {
        execution_plan: serde_json::to_string_pretty(value).unwrap_or_default(),
        ..Default::default()
    };
    for root in &roots {
        visit_plan_node(&root.plan, &mut summary);
    }
    Ok(summary)
}

fn visit_plan_node(node: &PlanNode, summary: &mut PlanSummary) {
    if let Some(index) = &node.index_name {
        push_unique(&mut summary.indexes_used, index);
    }
    // Only full scans count as "tables scanned"; an index scan's relation
    // is already being served by its index.
    if node.node_type == "Seq Scan" {
        if let Some(relation) = &node.relation_name {
            push_unique(&mut summary.tables_scanned, relation);
        }
    }
    for child in &node.children {
        visit_plan_node(child, summary);
    }
}

/// Normalizes `EXPLAIN QUERY PLAN` detail lines. Handles both the legacy
/// `SCAN TABLE x` / `SEARCH TABLE x USING INDEX y` spelling and the
/// current `SCAN x` / `SEARCH x USING INDEX y` one.
pub fn parse_sqlite_plan(lines: &[String]) -> PlanSummary {
    let mut summary = PlanSummary {
        execution_plan: lines.join("\n"),
        ..Default::default()
    };

    for line in lines {
        let detail = line.trim();
        let upper = detail.to_ascii_uppercase();

        if let Some(pos) = upper
            .find("USING COVERING INDEX ")
            .map(|p| p + "USING COVERING INDEX ".len())
            .or_else(|| upper.find("USING INDEX ").map(|p| p + "USING INDEX ".len()))
        {
            if let Some(name) = first_token(&detail[pos..]) {
                push_unique(&mut summary.indexes_used, name);
            }
            continue;
        }

        if let Some(rest) = upper.strip_prefix("SCAN ") {
            let skip = if rest.starts_with("TABLE ") {
                "SCAN TABLE ".len()
            } else {
                "SCAN ".len()
            };
            if let Some(table) = first_token(&detail[skip..]) {
                push_unique(&mut summary.tables_scanned, table);
            }
        }
    }
    summary
}

/// Whether the plan references `index_name` anywhere, either as a parsed
/// index or in the raw plan text (covering-index phrasing varies between
/// SQLite versions). The raw-text match requires token boundaries so a
/// prefix-sharing sibling like `idx_users_email2` does not count as
/// `idx_users_email`.
pub fn plan_mentions_index(summary: &PlanSummary, index_name: &str) -> bool {
    summary
        .indexes_used
        .iter()
        .any(|used| used.eq_ignore_ascii_case(index_name))
        || contains_identifier(&summary.execution_plan, index_name)
}

fn contains_identifier(text: &str, name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    let bytes = text.as_bytes();
    let mut from = 0;
    while let Some(rel) = text[from..].find(name) {
        let pos = from + rel;
        let end = pos + name.len();
        let before_ok = pos == 0 || !is_identifier_byte(bytes[pos - 1]);
        let after_ok = end >= bytes.len() || !is_identifier_byte(bytes[end]);
        if before_ok && after_ok {
            return true;
        }
        from = end;
    }
    false
}

fn is_identifier_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

/// Runs the dialect's explain facility over `sql` and attaches candidate
/// indexes when the plan fell back to full scans. Failures land in the
/// `error` field instead of propagating, so callers assembling aggregate
/// reports tolerate per-query gaps.
pub async fn analyze_query(
    strategy: &dyn DialectStrategy,
    schema: &[TableSchema],
    sql: &str,
) -> QueryAnalysis {
    match strategy.explain_plan(sql).await {
        Ok(summary) => {
            let recommendations = if summary.indexes_used.is_empty()
                && !summary.tables_scanned.is_empty()
            {
                derive_candidates(sql, &summary.tables_scanned, schema)
            } else {
                Vec::new()
            };
            QueryAnalysis {
                execution_plan: summary.execution_plan,
                indexes_used: summary.indexes_used,
                tables_scanned: summary.tables_scanned,
                recommendations,
                error: None,
            }
        }
        Err(err) => {
            debug!("Plan analysis failed: {}", err);
            QueryAnalysis {
                error: Some(err.to_string()),
                ..Default::default()
            }
        }
    }
}

/// Proposes one single-column index per filtered column of `sql`. Columns
/// are resolved to their owning table by explicit qualifier first, then by
/// searching the scanned tables and the reflected schema.
pub fn derive_candidates(
    sql: &str,
    tables_scanned: &[String],
    schema: &[TableSchema],
) -> Vec<IndexRecommendation> {
    let scope = predicates::table_scope(sql);
    let mut candidates = Vec::new();
    let mut seen: Vec<(String, String)> = Vec::new();

    for condition in predicates::extract_conditions(sql) {
        let Some(table) = resolve_owning_table(&condition, &scope, tables_scanned, schema) else {
            continue;
        };
        let pair = (table.clone(), condition.column.clone());
        if seen.contains(&pair) {
            continue;
        }
        seen.push(pair);

        let Ok(definition) = IndexDefinition::new(&table, &[condition.column.as_str()], false)
        else {
            continue;
        };
        let kind = match condition.kind {
            ConditionKind::Equality => "equality",
            ConditionKind::Range => "range",
        };
        let rationale = format!(
            "query filters on {}.{} with an {} predicate but the plan used no index",
            table, condition.column, kind
        );
        candidates.push(IndexRecommendation::create(
            definition,
            rationale,
            Priority::Medium,
        ));
    }
    candidates
}

fn resolve_owning_table(
    condition: &FilterCondition,
    scope: &predicates::TableScope,
    tables_scanned: &[String],
    schema: &[TableSchema],
) -> Option<String> {
    if let Some(qualifier) = &condition.qualifier {
        if let Some(table) = scope.resolve(qualifier) {
            return Some(table);
        }
        // Qualifier that is neither an alias nor a known scope table is
        // taken at face value when the schema knows it.
        return schema
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(qualifier))
            .map(|t| t.name.clone());
    }

    let owns_column = |name: &str| {
        schema
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
            .is_some_and(|t| {
                t.columns
                    .iter()
                    .any(|c| c.eq_ignore_ascii_case(&condition.column))
            })
    };

    tables_scanned
        .iter()
        .find(|t| owns_column(t))
        .or_else(|| scope.tables.iter().find(|t| owns_column(t)))
        .cloned()
        .or_else(|| {
            schema
                .iter()
                .find(|t| {
                    t.columns
                        .iter()
                        .any(|c| c.eq_ignore_ascii_case(&condition.column))
                })
                .map(|t| t.name.clone())
        })
}

/// First identifier-like token of `text`, used to lift table and index
/// names out of plan detail lines.
fn first_token(text: &str) -> Option<&str> {
    let token = text
        .trim_start()
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()?;
    let token = token.trim_end_matches(|c: char| !(c.is_ascii_alphanumeric() || c == '_'));
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

fn push_unique(values: &mut Vec<String>, value: &str) {
    if !values.iter().any(|v| v.eq_ignore_ascii_case(value)) {
        values.push(value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn users_schema() -> Vec<TableSchema> {
        vec![TableSchema {
            name: "users".into(),
            columns: vec!["id".into(), "name".into(), "email".into(), "status".into()],
            indexes: vec![],
            foreign_keys: vec![],
            row_count: 0,
            size_bytes: None,
        }]
    }

    #[test]
    fn walks_nested_postgres_plan() {
        let value = json!([{
            "Plan": {
                "Node Type": "Nested Loop",
                "Plans": [
                    {
                        "Node Type": "Index Scan",
                        "Relation Name": "users",
                        "Index Name": "unq_users_email"
                    },
                    {
                        "Node Type": "Seq Scan",
                        "Relation Name": "posts"
                    }
                ]
            }
        }]);

        let summary = parse_postgres_plan(&value).expect("plan should parse");
        assert_eq!(summary.indexes_used, vec!["unq_users_email"]);
        assert_eq!(summary.tables_scanned, vec!["posts"]);
    }

    #[test]
    fn index_scan_relation_is_not_a_full_scan() {
        let value = json!([{
            "Plan": {
                "Node Type": "Index Only Scan",
                "Relation Name": "users",
                "Index Name": "idx_users_status"
            }
        }]);

        let summary = parse_postgres_plan(&value).expect("plan should parse");
        assert!(summary.tables_scanned.is_empty());
        assert_eq!(summary.indexes_used, vec!["idx_users_status"]);
    }

    #[test]
    fn parses_sqlite_search_and_scan_lines() {
        let lines = vec![
            "SEARCH users USING INDEX unq_users_email (email=?)".to_string(),
            "SCAN posts".to_string(),
        ];
        let summary = parse_sqlite_plan(&lines);
        assert_eq!(summary.indexes_used, vec!["unq_users_email"]);
        assert_eq!(summary.tables_scanned, vec!["posts"]);
    }

    #[test]
    fn parses_legacy_sqlite_scan_table_spelling() {
        let lines = vec![
            "SCAN TABLE posts".to_string(),
            "SEARCH TABLE users USING COVERING INDEX idx_users_status (status=?)".to_string(),
        ];
        let summary = parse_sqlite_plan(&lines);
        assert_eq!(summary.tables_scanned, vec!["posts"]);
        assert_eq!(summary.indexes_used, vec!["idx_users_status"]);
    }

    #[test]
    fn mentions_index_matches_raw_plan_text() {
        let summary = PlanSummary {
            execution_plan: "SEARCH users USING COVERING INDEX unq_users_email".into(),
            indexes_used: vec![],
            tables_scanned: vec![],
        };
        assert!(plan_mentions_index(&summary, "unq_users_email"));
        assert!(!plan_mentions_index(&summary, "idx_users_status"));
    }

    #[test]
    fn mentions_index_requires_token_boundaries() {
        let summary = PlanSummary {
            execution_plan: "SEARCH users USING INDEX idx_users_email2 (email=?)".into(),
            indexes_used: vec![],
            tables_scanned: vec![],
        };
        // A prefix-sharing sibling name must not count as a hit.
        assert!(!plan_mentions_index(&summary, "idx_users_email"));
        assert!(plan_mentions_index(&summary, "idx_users_email2"));
    }

    #[test]
    fn derives_candidate_for_filtered_column() {
        let recommendations = derive_candidates(
            "SELECT * FROM users WHERE email = 'x'",
            &["users".to_string()],
            &users_schema(),
        );
        assert_eq!(recommendations.len(), 1);
        let def = recommendations[0].index_definition.as_ref().unwrap();
        assert_eq!(def.table, "users");
        assert_eq!(def.columns, vec!["email"]);
    }

    #[test]
    fn resolves_alias_qualifiers() {
        let recommendations = derive_candidates(
            "SELECT * FROM users u WHERE u.status = 'active'",
            &["users".to_string()],
            &users_schema(),
        );
        assert_eq!(recommendations.len(), 1);
        let def = recommendations[0].index_definition.as_ref().unwrap();
        assert_eq!(def.table, "users");
        assert_eq!(def.columns, vec!["status"]);
    }

    #[test]
    fn skips_columns_owned_by_no_known_table() {
        let recommendations = derive_candidates(
            "SELECT * FROM users WHERE nonexistent_col = 1",
            &["users".to_string()],
            &users_schema(),
        );
        assert!(recommendations.is_empty());
    }
}
