//! Best-effort predicate extraction from raw SQL text.
//!
//! This is a deliberate heuristic, not a SQL parser: the WHERE clause is
//! split on `AND` and each side classified as an equality or range
//! condition. Known limits, kept on purpose because downstream treats the
//! output as advisory only:
//!
//! - `OR` conditions are skipped entirely rather than mis-attributed;
//! - nested parenthesized groups are not unwrapped beyond leading parens;
//! - quoted literals containing `AND`/`=` will confuse the splitter.
//!
//! Table scope (FROM/JOIN tables and their aliases) is collected with
//! `sqlparser`, which degrades to an empty scope on any parse failure.

use sqlparser::ast::{SetExpr, Statement, TableFactor, TableWithJoins};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionKind {
    Equality,
    Range,
}

/// One filter condition lifted out of a WHERE clause.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCondition {
    /// Explicit `table.` (or alias) qualifier, when present.
    pub qualifier: Option<String>,
    pub column: String,
    pub kind: ConditionKind,
}

/// Tables visible to a query, with alias resolution.
#[derive(Debug, Clone, Default)]
pub struct TableScope {
    pub tables: Vec<String>,
    pub aliases: HashMap<String, String>,
}

impl TableScope {
    /// Resolves a qualifier (alias or table name) to a table name.
    pub fn resolve(&self, qualifier: &str) -> Option<String> {
        if let Some(table) = self.aliases.get(qualifier) {
            return Some(table.clone());
        }
        self.tables
            .iter()
            .find(|t| t.eq_ignore_ascii_case(qualifier))
            .cloned()
    }
}

/// Splits the WHERE clause of `sql` into individual filter conditions.
pub fn extract_conditions(sql: &str) -> Vec<FilterCondition> {
    let Some(clause) = where_clause(sql) else {
        return Vec::new();
    };

    split_on_and(&clause)
        .into_iter()
        .filter(|part| !contains_keyword(part, "OR"))
        .filter_map(|part| parse_condition(&part))
        .collect()
}

/// Collects the FROM/JOIN tables of `sql` via `sqlparser`. Best-effort:
/// any parse failure yields an empty scope.
pub fn table_scope(sql: &str) -> TableScope {
    let dialect = GenericDialect {};
    let Ok(statements) = Parser::parse_sql(&dialect, sql) else {
        return TableScope::default();
    };

    let mut scope = TableScope::default();
    for statement in &statements {
        if let Statement::Query(query) = statement {
            if let SetExpr::Select(select) = query.body.as_ref() {
                for table in &select.from {
                    collect_table_with_joins(table, &mut scope);
                }
            }
        }
    }
    scope
}

fn collect_table_with_joins(table: &TableWithJoins, scope: &mut TableScope) {
    collect_table_factor(&table.relation, scope);
    for join in &table.joins {
        collect_table_factor(&join.relation, scope);
    }
}

fn collect_table_factor(factor: &TableFactor, scope: &mut TableScope) {
    if let TableFactor::Table { name, alias, .. } = factor {
        let table = name
            .0
            .last()
            .map(|ident| ident.value.clone())
            .unwrap_or_default();
        if table.is_empty() {
            return;
        }
        if let Some(alias) = alias {
            scope
                .aliases
                .insert(alias.name.value.clone(), table.clone());
        }
        scope.tables.push(table);
    }
}

fn where_clause(sql: &str) -> Option<String> {
    let upper = sql.to_ascii_uppercase();
    let start = find_keyword(&upper, "WHERE")? + "WHERE".len();
    let tail = &sql[start..];
    let tail_upper = &upper[start..];

    let mut end = tail.len();
    for terminator in ["GROUP BY", "ORDER BY", "HAVING", "LIMIT", ";"] {
        if let Some(pos) = find_keyword(tail_upper, terminator) {
            end = end.min(pos);
        }
    }
    Some(tail[..end].trim().to_string())
}

/// Finds `keyword` in (already-uppercased) `haystack` at a word boundary.
fn find_keyword(haystack: &str, keyword: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(rel) = haystack[from..].find(keyword) {
        let pos = from + rel;
        let before_ok = pos == 0
            || !haystack.as_bytes()[pos - 1].is_ascii_alphanumeric()
                && haystack.as_bytes()[pos - 1] != b'_';
        let after = pos + keyword.len();
        let after_ok = after >= haystack.len()
            || !haystack.as_bytes()[after].is_ascii_alphanumeric()
                && haystack.as_bytes()[after] != b'_';
        if before_ok && after_ok {
            return Some(pos);
        }
        from = pos + keyword.len();
    }
    None
}

fn contains_keyword(text: &str, keyword: &str) -> bool {
    find_keyword(&text.to_ascii_uppercase(), keyword).is_some()
}

fn split_on_and(clause: &str) -> Vec<String> {
    let upper = clause.to_ascii_uppercase();
    let mut parts = Vec::new();
    let mut start = 0;
    let mut from = 0;
    while let Some(rel) = upper[from..].find("AND") {
        let pos = from + rel;
        let before_ok =
            pos == 0 || upper.as_bytes()[pos - 1].is_ascii_whitespace();
        let after = pos + 3;
        let after_ok = after >= upper.len() || upper.as_bytes()[after].is_ascii_whitespace();
        if before_ok && after_ok && pos > start {
            parts.push(clause[start..pos].trim().to_string());
            start = after;
        }
        from = after;
    }
    parts.push(clause[start..].trim().to_string());
    parts.retain(|p| !p.is_empty());
    parts
}

fn parse_condition(part: &str) -> Option<FilterCondition> {
    let upper = part.to_ascii_uppercase();

    // Operator table, longest first so `<=` wins over `<`.
    let symbol_ops: [(&str, ConditionKind); 7] = [
        ("<=", ConditionKind::Range),
        (">=", ConditionKind::Range),
        ("<>", ConditionKind::Equality),
        ("!=", ConditionKind::Equality),
        ("=", ConditionKind::Equality),
        ("<", ConditionKind::Range),
        (">", ConditionKind::Range),
    ];
    let keyword_ops: [(&str, ConditionKind); 3] = [
        ("BETWEEN", ConditionKind::Range),
        ("LIKE", ConditionKind::Range),
        ("IN", ConditionKind::Equality),
    ];

    let (lhs, kind) = symbol_ops
        .iter()
        .filter_map(|(op, kind)| part.find(op).map(|pos| (pos, *kind)))
        .min_by_key(|(pos, _)| *pos)
        .map(|(pos, kind)| (&part[..pos], kind))
        .or_else(|| {
            keyword_ops
                .iter()
                .filter_map(|(op, kind)| find_keyword(&upper, op).map(|pos| (pos, *kind)))
                .min_by_key(|(pos, _)| *pos)
                .map(|(pos, kind)| (&part[..pos], kind))
        })?;

    let lhs = lhs.trim().trim_start_matches('(').trim();
    column_ref(lhs).map(|(qualifier, column)| FilterCondition {
        qualifier,
        column,
        kind,
    })
}

/// Accepts `column`, `table.column`, or `schema.table.column` (keeping the
/// last two segments). Anything that is not a plain identifier chain, such
/// as a function call, is rejected.
fn column_ref(lhs: &str) -> Option<(Option<String>, String)> {
    if lhs.is_empty() || lhs.contains('(') || lhs.contains(char::is_whitespace) {
        return None;
    }

    let segments: Vec<&str> = lhs.split('.').map(|s| s.trim_matches('"')).collect();
    if segments
        .iter()
        .any(|s| s.is_empty() || !s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
    {
        return None;
    }

    match segments.len() {
        1 => Some((None, segments[0].to_string())),
        2 => Some((Some(segments[0].to_string()), segments[1].to_string())),
        3 => Some((Some(segments[1].to_string()), segments[2].to_string())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn splits_simple_and_conditions() {
        let conditions =
            extract_conditions("SELECT * FROM users WHERE email = 'x' AND created_at > '2024'");
        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[0].column, "email");
        assert_eq!(conditions[0].kind, ConditionKind::Equality);
        assert_eq!(conditions[1].column, "created_at");
        assert_eq!(conditions[1].kind, ConditionKind::Range);
    }

    #[test]
    fn keeps_table_qualifiers() {
        let conditions =
            extract_conditions("SELECT * FROM posts p WHERE p.user_id = 1 AND p.title LIKE 'a%'");
        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[0].qualifier.as_deref(), Some("p"));
        assert_eq!(conditions[0].column, "user_id");
        assert_eq!(conditions[1].kind, ConditionKind::Range);
    }

    #[test]
    fn stops_at_order_by() {
        let conditions =
            extract_conditions("SELECT * FROM users WHERE status = 'a' ORDER BY created_at");
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].column, "status");
    }

    #[rstest]
    #[case("SELECT * FROM users WHERE a = 1 OR b = 2")]
    #[case("SELECT * FROM users WHERE lower(email) = 'x'")]
    #[case("SELECT * FROM users")]
    fn known_limits_yield_no_conditions(#[case] sql: &str) {
        // Documented heuristic boundary: OR chains, expression predicates
        // and queries without WHERE produce nothing rather than noise.
        assert!(extract_conditions(sql).is_empty());
    }

    #[test]
    fn in_and_between_are_classified() {
        let conditions = extract_conditions(
            "SELECT * FROM executions WHERE status IN ('pass','fail') AND executed_at BETWEEN 1 AND 2",
        );
        // The BETWEEN arm splits on its inner AND; that is the documented
        // misbehavior of a string splitter, so only the leading column of
        // each fragment survives identifier validation.
        assert_eq!(conditions[0].column, "status");
        assert_eq!(conditions[0].kind, ConditionKind::Equality);
        assert!(conditions
            .iter()
            .any(|c| c.column == "executed_at" && c.kind == ConditionKind::Range));
    }

    #[test]
    fn scope_collects_tables_and_aliases() {
        let scope =
            table_scope("SELECT * FROM posts p JOIN users u ON p.user_id = u.id WHERE u.id = 1");
        assert_eq!(scope.tables, vec!["posts", "users"]);
        assert_eq!(scope.resolve("p").as_deref(), Some("posts"));
        assert_eq!(scope.resolve("users").as_deref(), Some("users"));
        assert!(scope.resolve("missing").is_none());
    }

    #[test]
    fn scope_is_empty_on_unparsable_sql() {
        let scope = table_scope("this is not sql at all");
        assert!(scope.tables.is_empty());
    }
}
