//! End-to-end advisor behavior against in-memory SQLite databases.

use indexadvisor::advisor::IndexAdvisor;
use indexadvisor::config::AdvisorConfig;
use indexadvisor::dialect::{self, DialectStrategy, SqliteStrategy};
use indexadvisor::models::{IndexDefinition, Priority, RecommendationAction};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;

async fn advisor_with_schema(statements: &[&str]) -> IndexAdvisor {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory pool");
    for statement in statements {
        sqlx::query(statement).execute(&pool).await.expect("setup");
    }
    let strategy: Arc<dyn DialectStrategy> = Arc::new(SqliteStrategy::from_pool(pool));
    IndexAdvisor::from_strategy(strategy, AdvisorConfig::default())
}

#[tokio::test]
async fn index_lifecycle_roundtrip() {
    let advisor = advisor_with_schema(&[
        "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT NOT NULL)",
    ])
    .await;
    let manager = advisor.manager();

    let def = IndexDefinition::new("users", &["email"], true).unwrap();
    assert_eq!(def.name, "unq_users_email");

    assert!(!manager.check_index_exists(&def.name, Some("users")).await);
    assert!(manager.create_index(&def).await);
    assert!(manager.check_index_exists(&def.name, Some("users")).await);
    assert!(manager.check_index_exists(&def.name, None).await);

    assert!(manager.remove_index(&def.name, "users").await);
    assert!(!manager.check_index_exists(&def.name, Some("users")).await);
}

#[tokio::test]
async fn removing_a_missing_index_succeeds() {
    let advisor = advisor_with_schema(&["CREATE TABLE users (id INTEGER PRIMARY KEY)"]).await;
    let manager = advisor.manager();

    assert!(manager.remove_index("idx_users_never_created", "users").await);
}

#[tokio::test]
async fn creating_on_a_missing_table_fails_without_error() {
    let advisor = advisor_with_schema(&["CREATE TABLE users (id INTEGER PRIMARY KEY)"]).await;
    let manager = advisor.manager();

    let def = IndexDefinition::new("ghosts", &["name"], false).unwrap();
    assert!(!manager.create_index(&def).await);
}

#[tokio::test]
async fn uncovered_foreign_key_yields_one_high_priority_create() {
    let advisor = advisor_with_schema(&[
        "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT)",
        "CREATE TABLE posts (id INTEGER PRIMARY KEY, \
         user_id INTEGER REFERENCES users(id), title TEXT)",
    ])
    .await;

    let recommendations = advisor.recommend_indexes().await.unwrap();
    let creates: Vec<_> = recommendations
        .iter()
        .filter(|rec| rec.action == RecommendationAction::Create)
        .collect();

    assert_eq!(creates.len(), 1);
    let def = creates[0].index_definition.as_ref().unwrap();
    assert_eq!(def.table, "posts");
    assert_eq!(def.columns, vec!["user_id"]);
    assert_eq!(def.name, "idx_posts_user_id");
    assert_eq!(creates[0].priority, Priority::High);
}

#[tokio::test]
async fn covered_foreign_key_is_not_recommended() {
    let advisor = advisor_with_schema(&[
        "CREATE TABLE users (id INTEGER PRIMARY KEY)",
        "CREATE TABLE posts (id INTEGER PRIMARY KEY, user_id INTEGER REFERENCES users(id))",
        "CREATE INDEX idx_posts_user_id ON posts (user_id)",
    ])
    .await;

    let recommendations = advisor.recommend_indexes().await.unwrap();
    assert!(recommendations
        .iter()
        .all(|rec| rec.action != RecommendationAction::Create));
}

#[tokio::test]
async fn validation_counts_reconcile() {
    let advisor = advisor_with_schema(&[
        "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT, status TEXT)",
        "CREATE INDEX idx_users_email ON users (email)",
        "CREATE INDEX idx_users_status ON users (status)",
    ])
    .await;

    let report = advisor.generate_validation_report().await.unwrap();
    assert_eq!(
        report.indexes_validated,
        report.indexes_used + report.indexes_unused
    );
    assert_eq!(
        report.details.len(),
        report.indexes_validated + report.indexes_unknown
    );
    assert!(report.indexes_used >= 1);
    assert!(report
        .details
        .iter()
        .filter(|d| d.is_effective == Some(false))
        .all(|d| d.suggestion.is_some()));
}

#[tokio::test]
async fn full_report_covers_reflected_schema() {
    let advisor = advisor_with_schema(&[
        "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT)",
        "CREATE TABLE posts (id INTEGER PRIMARY KEY, user_id INTEGER REFERENCES users(id))",
        "INSERT INTO users (email) VALUES ('a@example.com'), ('b@example.com')",
    ])
    .await;

    let report = advisor.generate_index_report().await.unwrap();
    assert_eq!(report.database_type, "sqlite");
    assert_eq!(report.tables_count, 2);
    let users = report
        .table_statistics
        .iter()
        .find(|stats| stats.table == "users")
        .unwrap();
    assert_eq!(users.row_count, 2);
    assert_eq!(
        report.summary.recommendations_total,
        report.recommendations.len()
    );
}

#[tokio::test]
async fn baseline_on_foreign_schema_reports_failures_not_errors() {
    let advisor = advisor_with_schema(&["CREATE TABLE users (id INTEGER PRIMARY KEY)"]).await;

    let report = advisor.create_recommended_indexes().await;
    assert_eq!(report.success_count, 0);
    assert_eq!(report.skipped_count, 0);
    assert!(report.failed_count > 0);
    assert_eq!(report.details.len(), report.failed_count);
}

#[tokio::test]
async fn baseline_is_idempotent_on_matching_schema() {
    let advisor = advisor_with_schema(&[
        "CREATE TABLE folders (id INTEGER PRIMARY KEY, parent_id INTEGER, project_id INTEGER)",
        "CREATE TABLE test_cases (id INTEGER PRIMARY KEY, folder_id INTEGER, \
         key TEXT, status TEXT)",
        "CREATE TABLE executions (id INTEGER PRIMARY KEY, test_case_id INTEGER, \
         cycle_id INTEGER, status TEXT, executed_at TEXT)",
        "CREATE TABLE cycles (id INTEGER PRIMARY KEY, folder_id INTEGER, key TEXT)",
        "CREATE TABLE custom_fields (id INTEGER PRIMARY KEY, entity_type TEXT, \
         entity_id INTEGER)",
        "CREATE TABLE attachments (id INTEGER PRIMARY KEY, entity_type TEXT, \
         entity_id INTEGER)",
        "CREATE TABLE migration_state (id INTEGER PRIMARY KEY, entity_type TEXT)",
    ])
    .await;

    let first = advisor.create_recommended_indexes().await;
    assert_eq!(first.failed_count, 0);
    assert!(first.success_count > 0);

    let second = advisor.create_recommended_indexes().await;
    assert_eq!(second.success_count, 0);
    assert_eq!(second.skipped_count, first.success_count);
}

#[tokio::test]
async fn query_analysis_captures_errors_and_candidates() {
    let advisor =
        advisor_with_schema(&["CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT)"]).await;

    let failed = advisor.analyze_query("SELECT FROM WHERE").await;
    assert!(failed.error.is_some());
    assert!(failed.recommendations.is_empty());
    assert!(failed.indexes_used.is_empty());

    let scanned = advisor
        .analyze_query("SELECT * FROM users WHERE email = 'x'")
        .await;
    assert!(scanned.error.is_none());
    assert_eq!(scanned.tables_scanned, vec!["users"]);
    assert!(scanned.indexes_used.is_empty());
    assert_eq!(scanned.recommendations.len(), 1);
    let def = scanned.recommendations[0].index_definition.as_ref().unwrap();
    assert_eq!(def.table, "users");
    assert_eq!(def.columns, vec!["email"]);
}

#[tokio::test]
async fn constraint_autoindexes_are_not_advisory_targets() {
    let advisor = advisor_with_schema(&[
        "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT UNIQUE, status TEXT)",
    ])
    .await;

    let analyses = advisor.analyze_usage().await.unwrap();
    assert!(analyses
        .iter()
        .all(|a| !a.name.starts_with("sqlite_autoindex_")));

    let recommendations = advisor.recommend_indexes().await.unwrap();
    assert!(recommendations
        .iter()
        .all(|rec| rec
            .existing_index_name
            .as_deref()
            .map_or(true, |name| !name.starts_with("sqlite_autoindex_"))));

    // Reflection still sees the constraint index, so coverage and
    // existence checks keep working.
    assert!(
        advisor
            .manager()
            .check_index_exists("sqlite_autoindex_users_1", Some("users"))
            .await
    );
}

#[tokio::test]
async fn verify_reports_a_selected_index() {
    let advisor = advisor_with_schema(&[
        "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT)",
        "CREATE INDEX idx_users_email ON users (email)",
    ])
    .await;

    let result = advisor
        .verify_index_usage("idx_users_email", "SELECT * FROM users WHERE email = 'a'")
        .await;
    assert!(result.is_used);
    assert!(result.execution_plan.contains("idx_users_email"));

    let miss = advisor
        .verify_index_usage("idx_users_email", "SELECT * FROM users WHERE id = 1")
        .await;
    assert!(!miss.is_used);
}

#[tokio::test]
async fn verify_survives_invalid_sql() {
    let advisor = advisor_with_schema(&["CREATE TABLE users (id INTEGER PRIMARY KEY)"]).await;

    let result = advisor
        .verify_index_usage("idx_users_email", "SELECT FROM WHERE")
        .await;
    assert!(!result.is_used);
    assert!(result.explanation.contains("plan analysis failed"));
}

#[tokio::test]
async fn connect_rejects_unknown_schemes() {
    let err = dialect::connect("mysql://localhost/app").await.err();
    assert!(err.is_some());
    assert!(err.unwrap().to_string().contains("unsupported"));
}
