use clap::{Parser, Subcommand};
use indexadvisor::advisor::IndexAdvisor;
use indexadvisor::config::AdvisorConfig;
use indexadvisor::reporter::{self, ReportFormat, Reporter};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Database index advisor - analyzes schemas and suggests index improvements
#[derive(Parser, Debug)]
#[command(name = "indexadvisor")]
#[command(version = "0.1.0")]
#[command(about = "Index advisor for SQLite and PostgreSQL")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Database connection URL (sqlite: or postgres: scheme)
    #[arg(short = 'u', long = "url", env = "DATABASE_URL", global = true)]
    url: Option<String>,

    /// Output format
    #[arg(short = 'f', long = "format", value_enum, default_value = "markdown", global = true)]
    format: ReportFormat,

    /// Write the report as JSON to this path in addition to stdout
    #[arg(short = 'o', long = "output", global = true)]
    output: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Full analysis: schema statistics, index usage and recommendations
    Analyze {
        /// Minimum scan count for an index to count as used
        #[arg(long = "usage-threshold", default_value_t = 10)]
        usage_threshold: i64,

        /// Call count above which a slow-query candidate is high priority
        #[arg(long = "high-priority-calls", default_value_t = 100)]
        high_priority_calls: i64,
    },

    /// Validate existing indexes against observed usage
    Validate {
        /// Minimum scan count for an index to count as used
        #[arg(long = "usage-threshold", default_value_t = 10)]
        usage_threshold: i64,
    },

    /// Build a prioritized optimization plan without applying anything
    Optimize,

    /// Check whether a specific index serves a specific query
    Verify {
        /// Index name to look for in the plan
        #[arg(long = "index")]
        index: String,

        /// Query to explain
        #[arg(long = "query")]
        query: String,
    },

    /// Apply the curated baseline index set
    Baseline,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let url = cli
        .url
        .ok_or_else(|| anyhow::anyhow!("no database URL given (use --url or DATABASE_URL)"))?;
    let reporter = Reporter::new(cli.format);

    match cli.command {
        Commands::Analyze {
            usage_threshold,
            high_priority_calls,
        } => {
            let config = AdvisorConfig::default()
                .with_usage_threshold(usage_threshold)
                .with_high_priority_calls(high_priority_calls);
            let advisor = IndexAdvisor::connect(&url, config).await?;
            let report = advisor.generate_index_report().await?;

            reporter.report_index(&report)?;
            if let Some(path) = &cli.output {
                reporter::write_json_report(&report, path)?;
                info!("Report written to {}", path.display());
            }
        }
        Commands::Validate { usage_threshold } => {
            let config = AdvisorConfig::default().with_usage_threshold(usage_threshold);
            let advisor = IndexAdvisor::connect(&url, config).await?;
            let report = advisor.generate_validation_report().await?;

            reporter.report_validation(&report)?;
            if let Some(path) = &cli.output {
                reporter::write_json_report(&report, path)?;
                info!("Report written to {}", path.display());
            }
        }
        Commands::Optimize => {
            let advisor = IndexAdvisor::connect(&url, AdvisorConfig::default()).await?;
            let plan = advisor.generate_optimization_plan().await?;

            reporter.report_plan(&plan)?;
            if let Some(path) = &cli.output {
                reporter::write_json_report(&plan, path)?;
                info!("Plan written to {}", path.display());
            }
        }
        Commands::Verify { index, query } => {
            let advisor = IndexAdvisor::connect(&url, AdvisorConfig::default()).await?;
            let result = advisor.verify_index_usage(&index, &query).await;

            println!(
                "{}: {}",
                if result.is_used { "USED" } else { "NOT USED" },
                result.explanation
            );
            if !result.execution_plan.is_empty() {
                println!("\n{}", result.execution_plan);
            }
            if let Some(path) = &cli.output {
                reporter::write_json_report(&result, path)?;
            }
        }
        Commands::Baseline => {
            let advisor = IndexAdvisor::connect(&url, AdvisorConfig::default()).await?;
            let report = advisor.create_recommended_indexes().await;

            reporter.report_apply(&report)?;
            if let Some(path) = &cli.output {
                reporter::write_json_report(&report, path)?;
            }
        }
    }

    Ok(())
}
