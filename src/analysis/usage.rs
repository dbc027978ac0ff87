//! Helpers for the usage/effectiveness analyzer.
//!
//! The dialect strategies own the engine queries; the pure parsing lives
//! here so it can be tested without a server. PostgreSQL exposes each
//! index's own DDL through `pg_get_indexdef`, which is the only reliable
//! source for column order and access method in the stats view.

use crate::models::IndexKind;

/// Parses the column list and access method out of an index DDL string of
/// the form `CREATE [UNIQUE] INDEX name ON table USING method (col, ...)`.
/// Expression members are kept as their raw text; a missing `USING` clause
/// falls back to btree.
pub fn parse_index_definition(definition: &str) -> (Vec<String>, IndexKind) {
    let upper = definition.to_ascii_uppercase();

    let kind = upper
        .find(" USING ")
        .map(|pos| {
            let tail = &definition[pos + " USING ".len()..];
            let method: String = tail.chars().take_while(|c| c.is_ascii_alphanumeric()).collect();
            IndexKind::parse(&method)
        })
        .unwrap_or_default();

    let columns = definition
        .find('(')
        .and_then(|open| definition.rfind(')').map(|close| (open, close)))
        .filter(|(open, close)| open < close)
        .map(|(open, close)| {
            split_top_level(&definition[open + 1..close])
                .into_iter()
                .map(|col| {
                    col.trim()
                        .trim_matches('"')
                        .trim_end_matches(" DESC")
                        .trim_end_matches(" ASC")
                        .to_string()
                })
                .filter(|col| !col.is_empty())
                .collect()
        })
        .unwrap_or_default();

    (columns, kind)
}

/// Splits on commas that are not nested inside parentheses, so expression
/// index members like `lower(email)` survive intact.
fn split_top_level(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for ch in text.chars() {
        match ch {
            '(' => {
                depth += 1;
                current.push(ch);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if depth == 0 => {
                parts.push(current.clone());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current);
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(
        "CREATE INDEX idx_posts_user_id ON public.posts USING btree (user_id)",
        &["user_id"],
        IndexKind::Btree
    )]
    #[case(
        "CREATE UNIQUE INDEX unq_test_cases_key ON test_cases USING btree (project_id, key)",
        &["project_id", "key"],
        IndexKind::Btree
    )]
    #[case(
        "CREATE INDEX idx_cases_labels ON test_cases USING gin (labels)",
        &["labels"],
        IndexKind::Gin
    )]
    fn parses_columns_and_kind(
        #[case] definition: &str,
        #[case] expected_columns: &[&str],
        #[case] expected_kind: IndexKind,
    ) {
        let (columns, kind) = parse_index_definition(definition);
        assert_eq!(columns, expected_columns);
        assert_eq!(kind, expected_kind);
    }

    #[test]
    fn keeps_expression_members_intact() {
        let (columns, _) = parse_index_definition(
            "CREATE INDEX idx_users_lower_email ON users USING btree (lower(email), status)",
        );
        assert_eq!(columns, vec!["lower(email)", "status"]);
    }

    #[test]
    fn missing_using_clause_defaults_to_btree() {
        let (columns, kind) = parse_index_definition("CREATE INDEX i ON t (a, b)");
        assert_eq!(columns, vec!["a", "b"]);
        assert_eq!(kind, IndexKind::Btree);
    }

    #[test]
    fn strips_sort_direction_markers() {
        let (columns, _) = parse_index_definition(
            "CREATE INDEX idx ON executions USING btree (executed_at DESC)",
        );
        assert_eq!(columns, vec!["executed_at"]);
    }
}
