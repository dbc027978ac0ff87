use crate::models::{
    ApplyReport, ApplyStatus, IndexRecommendation, IndexReport, OptimizationPlan, Priority,
    ValidationReport,
};
use clap::ValueEnum;
use snafu::{ResultExt, Snafu};
use std::path::Path;

#[derive(Debug, Snafu)]
pub enum ReporterError {
    #[snafu(display("Failed to write output: {}", source))]
    OutputError { source: std::io::Error },

    #[snafu(display("Failed to serialize report: {}", source))]
    SerializeError { source: serde_json::Error },
}

type Result<T, E = ReporterError> = std::result::Result<T, E>;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ReportFormat {
    /// Markdown formatted report
    Markdown,
    /// JSON formatted report
    Json,
    /// Plain text summary
    Text,
}

pub struct Reporter {
    format: ReportFormat,
}

impl Reporter {
    pub fn new(format: ReportFormat) -> Self {
        Self { format }
    }

    pub fn report_index(&self, report: &IndexReport) -> Result<()> {
        match self.format {
            ReportFormat::Markdown => self.index_markdown(report)?,
            ReportFormat::Json => print_json(report)?,
            ReportFormat::Text => self.index_text(report)?,
        }
        Ok(())
    }

    pub fn report_validation(&self, report: &ValidationReport) -> Result<()> {
        match self.format {
            ReportFormat::Markdown => self.validation_markdown(report)?,
            ReportFormat::Json => print_json(report)?,
            ReportFormat::Text => self.validation_text(report)?,
        }
        Ok(())
    }

    pub fn report_plan(&self, plan: &OptimizationPlan) -> Result<()> {
        match self.format {
            ReportFormat::Markdown => self.plan_markdown(plan)?,
            ReportFormat::Json => print_json(plan)?,
            ReportFormat::Text => self.plan_text(plan)?,
        }
        Ok(())
    }

    pub fn report_apply(&self, report: &ApplyReport) -> Result<()> {
        match self.format {
            ReportFormat::Json => print_json(report)?,
            _ => self.apply_text(report)?,
        }
        Ok(())
    }

    fn index_markdown(&self, report: &IndexReport) -> Result<()> {
        use std::io::Write;

        let stdout = std::io::stdout();
        let mut handle = stdout.lock();

        writeln!(handle, "# Database Index Analysis Report\n").context(OutputSnafu)?;
        writeln!(handle, "- **Generated**: {}", report.generated_at).context(OutputSnafu)?;
        writeln!(handle, "- **Database**: {}", report.database_type).context(OutputSnafu)?;
        writeln!(handle, "- **Tables**: {}", report.tables_count).context(OutputSnafu)?;
        writeln!(handle, "- **Indexes**: {}", report.indexes_count).context(OutputSnafu)?;
        writeln!(handle).context(OutputSnafu)?;

        if !report.table_statistics.is_empty() {
            writeln!(handle, "## Tables\n").context(OutputSnafu)?;
            writeln!(handle, "| Table | Rows | Columns | Size |").context(OutputSnafu)?;
            writeln!(handle, "|-------|------|---------|------|").context(OutputSnafu)?;
            for stats in &report.table_statistics {
                writeln!(
                    handle,
                    "| {} | {} | {} | {} |",
                    stats.table,
                    stats.row_count,
                    stats.column_count,
                    format_size(stats.size_bytes)
                )
                .context(OutputSnafu)?;
            }
            writeln!(handle).context(OutputSnafu)?;
        }

        if !report.index_statistics.is_empty() {
            writeln!(handle, "## Index Usage\n").context(OutputSnafu)?;
            writeln!(handle, "| Index | Table | Columns | Scans | Effective |")
                .context(OutputSnafu)?;
            writeln!(handle, "|-------|-------|---------|-------|-----------|")
                .context(OutputSnafu)?;
            for analysis in &report.index_statistics {
                writeln!(
                    handle,
                    "| {} | {} | {} | {} | {} |",
                    analysis.name,
                    analysis.table,
                    analysis.columns.join(", "),
                    analysis
                        .usage_count
                        .map(|count| count.to_string())
                        .unwrap_or_else(|| "n/a".to_string()),
                    format_verdict(analysis.is_effective)
                )
                .context(OutputSnafu)?;
            }
            writeln!(handle).context(OutputSnafu)?;
        }

        let summary = &report.summary;
        writeln!(handle, "## Summary\n").context(OutputSnafu)?;
        writeln!(
            handle,
            "Found **{}** recommendations ({} ineffective of {} analyzed indexes):",
            summary.recommendations_total, summary.ineffective_indexes, summary.total_indexes
        )
        .context(OutputSnafu)?;
        writeln!(handle).context(OutputSnafu)?;
        for (label, count) in [
            ("HIGH", summary.recommendations_by_priority.high),
            ("MEDIUM", summary.recommendations_by_priority.medium),
            ("LOW", summary.recommendations_by_priority.low),
        ] {
            if count > 0 {
                writeln!(handle, "- **{}**: {}", label, count).context(OutputSnafu)?;
            }
        }
        writeln!(handle).context(OutputSnafu)?;

        if !report.recommendations.is_empty() {
            writeln!(handle, "## Recommendations\n").context(OutputSnafu)?;
            for rec in &report.recommendations {
                write_recommendation_markdown(&mut handle, rec)?;
            }
        }

        Ok(())
    }

    fn index_text(&self, report: &IndexReport) -> Result<()> {
        use std::io::Write;

        let stdout = std::io::stdout();
        let mut handle = stdout.lock();

        writeln!(handle, "Database Index Analysis Report").context(OutputSnafu)?;
        writeln!(handle, "==============================\n").context(OutputSnafu)?;
        writeln!(handle, "Database: {}", report.database_type).context(OutputSnafu)?;
        writeln!(
            handle,
            "Tables: {}, Indexes: {}",
            report.tables_count, report.indexes_count
        )
        .context(OutputSnafu)?;
        writeln!(handle).context(OutputSnafu)?;

        writeln!(handle, "Summary:").context(OutputSnafu)?;
        writeln!(
            handle,
            "  Total Recommendations: {}",
            report.summary.recommendations_total
        )
        .context(OutputSnafu)?;
        for (label, count) in [
            ("HIGH", report.summary.recommendations_by_priority.high),
            ("MEDIUM", report.summary.recommendations_by_priority.medium),
            ("LOW", report.summary.recommendations_by_priority.low),
        ] {
            if count > 0 {
                writeln!(handle, "  {}: {}", label, count).context(OutputSnafu)?;
            }
        }
        writeln!(handle).context(OutputSnafu)?;

        for rec in &report.recommendations {
            write_recommendation_text(&mut handle, rec)?;
        }

        Ok(())
    }

    fn validation_markdown(&self, report: &ValidationReport) -> Result<()> {
        use std::io::Write;

        let stdout = std::io::stdout();
        let mut handle = stdout.lock();

        writeln!(handle, "# Index Validation Report\n").context(OutputSnafu)?;
        writeln!(handle, "- **Generated**: {}", report.generated_at).context(OutputSnafu)?;
        writeln!(handle, "- **Database**: {}", report.database_type).context(OutputSnafu)?;
        writeln!(handle, "- **Validated**: {}", report.indexes_validated).context(OutputSnafu)?;
        writeln!(handle, "- **Used**: {}", report.indexes_used).context(OutputSnafu)?;
        writeln!(handle, "- **Unused**: {}", report.indexes_unused).context(OutputSnafu)?;
        if report.indexes_unknown > 0 {
            writeln!(handle, "- **Indeterminate**: {}", report.indexes_unknown)
                .context(OutputSnafu)?;
        }
        writeln!(handle).context(OutputSnafu)?;

        if !report.details.is_empty() {
            writeln!(handle, "| Index | Table | Verdict | Notes |").context(OutputSnafu)?;
            writeln!(handle, "|-------|-------|---------|-------|").context(OutputSnafu)?;
            for detail in &report.details {
                writeln!(
                    handle,
                    "| {} | {} | {} | {} |",
                    detail.index_name,
                    detail.table,
                    format_verdict(detail.is_effective),
                    detail.suggestion.as_deref().unwrap_or(&detail.notes)
                )
                .context(OutputSnafu)?;
            }
            writeln!(handle).context(OutputSnafu)?;
        }

        Ok(())
    }

    fn validation_text(&self, report: &ValidationReport) -> Result<()> {
        use std::io::Write;

        let stdout = std::io::stdout();
        let mut handle = stdout.lock();

        writeln!(handle, "Index Validation Report").context(OutputSnafu)?;
        writeln!(handle, "=======================\n").context(OutputSnafu)?;
        writeln!(
            handle,
            "Validated: {} (used: {}, unused: {}, indeterminate: {})",
            report.indexes_validated,
            report.indexes_used,
            report.indexes_unused,
            report.indexes_unknown
        )
        .context(OutputSnafu)?;
        writeln!(handle).context(OutputSnafu)?;

        for detail in &report.details {
            writeln!(
                handle,
                "  [{}] {} ({})",
                format_verdict(detail.is_effective),
                detail.index_name,
                detail.table
            )
            .context(OutputSnafu)?;
            if let Some(suggestion) = &detail.suggestion {
                writeln!(handle, "    Suggest: {}", suggestion).context(OutputSnafu)?;
            }
        }

        Ok(())
    }

    fn plan_markdown(&self, plan: &OptimizationPlan) -> Result<()> {
        use std::io::Write;

        let stdout = std::io::stdout();
        let mut handle = stdout.lock();

        writeln!(handle, "# Index Optimization Plan\n").context(OutputSnafu)?;
        writeln!(handle, "- **Generated**: {}", plan.generated_at).context(OutputSnafu)?;
        writeln!(handle, "- **Database**: {}", plan.database_type).context(OutputSnafu)?;
        writeln!(
            handle,
            "- **Actions**: {} create, {} remove, {} modify",
            plan.recommendations_by_action.create,
            plan.recommendations_by_action.remove,
            plan.recommendations_by_action.modify
        )
        .context(OutputSnafu)?;
        writeln!(handle).context(OutputSnafu)?;

        for priority in [Priority::High, Priority::Medium, Priority::Low] {
            let group: Vec<&IndexRecommendation> = plan
                .recommendations
                .iter()
                .filter(|rec| rec.priority == priority)
                .collect();
            if group.is_empty() {
                continue;
            }
            writeln!(handle, "## {} Priority\n", priority.as_str()).context(OutputSnafu)?;
            for rec in group {
                write_recommendation_markdown(&mut handle, rec)?;
            }
        }

        Ok(())
    }

    fn plan_text(&self, plan: &OptimizationPlan) -> Result<()> {
        use std::io::Write;

        let stdout = std::io::stdout();
        let mut handle = stdout.lock();

        writeln!(handle, "Index Optimization Plan").context(OutputSnafu)?;
        writeln!(handle, "=======================\n").context(OutputSnafu)?;
        writeln!(
            handle,
            "Recommendations: {} (high: {}, medium: {}, low: {})",
            plan.recommendations.len(),
            plan.recommendations_by_priority.high,
            plan.recommendations_by_priority.medium,
            plan.recommendations_by_priority.low
        )
        .context(OutputSnafu)?;
        writeln!(handle).context(OutputSnafu)?;

        for rec in &plan.recommendations {
            write_recommendation_text(&mut handle, rec)?;
        }

        Ok(())
    }

    fn apply_text(&self, report: &ApplyReport) -> Result<()> {
        use std::io::Write;

        let stdout = std::io::stdout();
        let mut handle = stdout.lock();

        writeln!(
            handle,
            "Baseline indexes: {} created, {} skipped, {} failed",
            report.success_count, report.skipped_count, report.failed_count
        )
        .context(OutputSnafu)?;
        for detail in &report.details {
            let status = match detail.status {
                ApplyStatus::Created => "created",
                ApplyStatus::Skipped => "skipped",
                ApplyStatus::Failed => "FAILED",
            };
            writeln!(
                handle,
                "  {:<8} {} ({})",
                status, detail.index_name, detail.table
            )
            .context(OutputSnafu)?;
        }

        Ok(())
    }
}

/// Writes a report as pretty-printed JSON to `path`, for downstream
/// tooling that consumes the serialized contract instead of stdout.
pub fn write_json_report<T: serde::Serialize>(report: &T, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context(SerializeSnafu)?;
    std::fs::write(path, json).context(OutputSnafu)?;
    Ok(())
}

fn print_json<T: serde::Serialize>(report: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context(SerializeSnafu)?;
    println!("{}", json);
    Ok(())
}

fn write_recommendation_markdown(
    handle: &mut std::io::StdoutLock,
    rec: &IndexRecommendation,
) -> Result<()> {
    use std::io::Write;

    let subject = rec
        .index_definition
        .as_ref()
        .map(|def| def.name.as_str())
        .or(rec.existing_index_name.as_deref())
        .unwrap_or("(unnamed)");
    writeln!(
        handle,
        "### {} `{}` [{}]\n",
        rec.action.as_str(),
        subject,
        rec.priority.as_str()
    )
    .context(OutputSnafu)?;

    if let Some(def) = &rec.index_definition {
        writeln!(
            handle,
            "**Target**: `{}({})`",
            def.table,
            def.columns.join(", ")
        )
        .context(OutputSnafu)?;
    }
    writeln!(handle, "**Rationale**: {}", rec.rationale).context(OutputSnafu)?;
    if let Some(impact) = &rec.estimated_impact {
        writeln!(handle, "**Impact**: {}", impact).context(OutputSnafu)?;
    }
    writeln!(handle).context(OutputSnafu)?;

    Ok(())
}

fn write_recommendation_text(
    handle: &mut std::io::StdoutLock,
    rec: &IndexRecommendation,
) -> Result<()> {
    use std::io::Write;

    let subject = rec
        .index_definition
        .as_ref()
        .map(|def| def.name.as_str())
        .or(rec.existing_index_name.as_deref())
        .unwrap_or("(unnamed)");
    writeln!(
        handle,
        "  [{}] {} {}",
        rec.priority.as_str(),
        rec.action.as_str(),
        subject
    )
    .context(OutputSnafu)?;
    writeln!(handle, "    Why: {}", rec.rationale).context(OutputSnafu)?;
    writeln!(handle).context(OutputSnafu)?;

    Ok(())
}

fn format_size(size_bytes: Option<i64>) -> String {
    match size_bytes {
        Some(bytes) if bytes >= 1024 * 1024 => format!("{:.1} MB", bytes as f64 / 1048576.0),
        Some(bytes) if bytes >= 1024 => format!("{:.1} KB", bytes as f64 / 1024.0),
        Some(bytes) => format!("{} B", bytes),
        None => "n/a".to_string(),
    }
}

fn format_verdict(is_effective: Option<bool>) -> &'static str {
    match is_effective {
        Some(true) => "used",
        Some(false) => "unused",
        None => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IndexDefinition, ReportSummary};

    #[test]
    fn formats_sizes_humanely() {
        assert_eq!(format_size(Some(512)), "512 B");
        assert_eq!(format_size(Some(2048)), "2.0 KB");
        assert_eq!(format_size(Some(3 * 1024 * 1024)), "3.0 MB");
        assert_eq!(format_size(None), "n/a");
    }

    #[test]
    fn json_report_round_trips_through_a_file() {
        let report = IndexReport {
            generated_at: "2026-01-01T00:00:00Z".into(),
            database_type: "sqlite".into(),
            tables_count: 1,
            indexes_count: 0,
            table_statistics: vec![],
            index_statistics: vec![],
            recommendations: vec![IndexRecommendation::create(
                IndexDefinition::new("posts", &["user_id"], false).unwrap(),
                "uncovered foreign key".into(),
                Priority::High,
            )],
            summary: ReportSummary::default(),
        };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        write_json_report(&report, &path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let parsed: IndexReport = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.database_type, "sqlite");
        assert_eq!(parsed.recommendations.len(), 1);
    }
}
