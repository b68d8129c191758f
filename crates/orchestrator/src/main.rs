//! `parquet-consolidator`: merges the small Parquet files of date partitions.

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use consolidation_common::{build_remote_store, ConsolidationMetrics};
use consolidation_orchestrator::{dates_ending_at, AppSettings, Consolidator, ShutdownSignal};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[global_allocator]
static GLOBAL: consolidation_worker::Jemalloc = consolidation_worker::Jemalloc;

/// Exit code for an invalid invocation or configuration.
const EXIT_INVALID: u8 = 2;

/// Upper bound for `--days-back` (ten years of partitions).
const MAX_DAYS_BACK: u32 = 3650;

const CRATE_TARGETS: &[&str] = &[
    "parquet_consolidator",
    "consolidation_common",
    "consolidation_planner",
    "consolidation_worker",
    "consolidation_orchestrator",
];

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "parquet-consolidator",
    version,
    about = "Consolidate small Parquet files in date-partitioned directories"
)]
struct Cli {
    /// Partition date to process (YYYY-MM-DD)
    #[arg(long)]
    date: NaiveDate,

    /// Report what would happen without changing anything
    #[arg(long)]
    dry_run: bool,

    /// Target size of a consolidated file in MB
    #[arg(long, value_name = "MB")]
    target_size: Option<u64>,

    /// Also process the N days before --date
    #[arg(
        long,
        value_name = "N",
        default_value_t = 0,
        value_parser = clap::value_parser!(u32).range(..=i64::from(MAX_DAYS_BACK))
    )]
    days_back: u32,

    /// Debug logging for the consolidator
    #[arg(short, long)]
    verbose: bool,

    /// TOML settings file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Write Prometheus metrics to this file when done
    #[arg(long, value_name = "PATH")]
    metrics_file: Option<PathBuf>,
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let level = if verbose { "debug" } else { "info" };
            let directives: Vec<String> = CRATE_TARGETS
                .iter()
                .map(|target| format!("{}={}", target, level))
                .collect();
            tracing_subscriber::EnvFilter::new(format!("info,{}", directives.join(",")))
        }
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let mut settings =
        AppSettings::load(cli.config.as_deref()).context("failed to load settings")?;
    if let Some(target_size) = cli.target_size {
        settings.consolidation = settings.consolidation.with_target_size_mb(target_size);
    }
    settings
        .consolidation
        .validate()
        .context("invalid consolidation settings")?;

    let store = build_remote_store(&settings.remote, &settings.policy)
        .context("failed to set up remote store")?;
    let metrics = Arc::new(ConsolidationMetrics::new());
    let shutdown = ShutdownSignal::new();
    tokio::spawn(shutdown.clone().listen_for_signals());

    let consolidator = Consolidator::new(settings.consolidation, store, metrics.clone(), shutdown)
        .context("failed to build consolidator")?;

    let dates = dates_ending_at(cli.date, cli.days_back).context("invalid --days-back")?;
    tracing::info!(
        base_path = %consolidator.config().base_path,
        target_size_mb = consolidator.config().target_file_size_mb,
        dry_run = cli.dry_run,
        "Processing {} date(s) ending {}",
        dates.len(),
        cli.date
    );

    let summary = consolidator.run_batch(&dates, cli.dry_run).await;

    if let LogFormat::Json = cli.log_format {
        match serde_json::to_string(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => tracing::warn!("Failed to serialize batch summary: {}", e),
        }
    }

    if let Some(path) = &cli.metrics_file {
        if let Err(e) = std::fs::write(path, metrics.to_prometheus()) {
            tracing::warn!(path = %path.display(), "Failed to write metrics: {}", e);
        }
    }

    Ok(summary.exit_code())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    match run(cli).await {
        Ok(0) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::from(EXIT_INVALID)
        }
    }
}
