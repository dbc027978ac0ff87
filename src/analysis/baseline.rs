//! Curated baseline indexes for the application's own schema.
//!
//! Unlike the dynamic recommendation path, this is a known-good default
//! set for the tables the migration system manages. Application is
//! best-effort per index: each create auto-commits on its own, so a
//! partial failure leaves previously-created indexes intact.

use crate::manager::IndexManager;
use crate::models::{ApplyDetail, ApplyReport, ApplyStatus, IndexDefinition};
use tracing::info;

/// The baseline set. Names are derived, so re-running the application is
/// idempotent: anything already present is skipped.
pub fn baseline_indexes() -> Vec<IndexDefinition> {
    let specs: &[(&str, &[&str], bool)] = &[
        ("folders", &["parent_id"], false),
        ("folders", &["project_id"], false),
        ("test_cases", &["folder_id"], false),
        ("test_cases", &["key"], true),
        ("test_cases", &["status"], false),
        ("executions", &["test_case_id"], false),
        ("executions", &["cycle_id"], false),
        ("executions", &["status"], false),
        ("executions", &["executed_at"], false),
        ("cycles", &["folder_id"], false),
        ("cycles", &["key"], true),
        ("custom_fields", &["entity_type", "entity_id"], false),
        ("attachments", &["entity_type", "entity_id"], false),
        ("migration_state", &["entity_type"], true),
    ];

    specs
        .iter()
        .filter_map(|(table, columns, unique)| IndexDefinition::new(table, columns, *unique).ok())
        .collect()
}

/// Applies the baseline: skip present, attempt create, tally the rest.
pub async fn apply_baseline(manager: &IndexManager) -> ApplyReport {
    let mut report = ApplyReport::default();

    for def in baseline_indexes() {
        let status = if manager.check_index_exists(&def.name, Some(&def.table)).await {
            report.skipped_count += 1;
            ApplyStatus::Skipped
        } else if manager.create_index(&def).await {
            report.success_count += 1;
            ApplyStatus::Created
        } else {
            report.failed_count += 1;
            ApplyStatus::Failed
        };

        report.details.push(ApplyDetail {
            index_name: def.name,
            table: def.table,
            status,
        });
    }

    info!(
        "Baseline application finished: {} created, {} skipped, {} failed",
        report.success_count, report.skipped_count, report.failed_count
    );
    report
}
