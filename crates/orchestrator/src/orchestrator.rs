/*
 * Workflow Orchestrator
 *
 * Sequences the phases for one date:
 *
 *   Scan -> Plan -> Sweep -> Plan -> (dry run?) -> Stage -> Fetch
 *        -> Merge+Verify -> Publish -> Reap -> Cleanup
 *
 * A preliminary plan on the scanned snapshot gates the sweep, so an
 * ineligible partition sees no remote mutation at all. Sweep candidates are
 * always below the minimum file size and cannot change the eligible set.
 *
 * Every failure, including a panic, stops at the date boundary and is
 * recorded in that date's report. The staging directory is removed on every
 * path.
 */

use chrono::{Duration as ChronoDuration, NaiveDate};
use consolidation_common::{
    ConsolidationConfig, ConsolidationError, ConsolidationMetrics, Identity, RemoteStore, Result,
    Timer,
};
use consolidation_planner::{ConsolidationPlan, ConsolidationPlanner, CorruptionSweeper, PartitionScanner};
use consolidation_worker::{
    MergeResult, Merger, MergerConfig, ParallelFetcher, Publisher, SourceReaper, StagedFile,
};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;

use crate::report::{
    BatchSummary, DateOutcome, DateReport, DryRunAnalysis, PlanSummary, ReapSummary, SweepSummary,
};
use crate::shutdown::ShutdownSignal;

/// Local file name of the merged output inside the staging directory.
const MERGED_FILE_NAME: &str = "consolidated.parquet";

/// Dates `end`, `end - 1`, ..., `end - days_back`, newest first. Fails when
/// the earliest date is outside the calendar range.
pub fn dates_ending_at(end: NaiveDate, days_back: u32) -> Result<Vec<NaiveDate>> {
    let span = ChronoDuration::days(i64::from(days_back));
    if end.checked_sub_signed(span).is_none() {
        return Err(ConsolidationError::Configuration(format!(
            "{} days before {} is out of range",
            days_back, end
        )));
    }

    Ok((0..=i64::from(days_back))
        .filter_map(|offset| end.checked_sub_signed(ChronoDuration::days(offset)))
        .collect())
}

/// Runs the consolidation workflow against one remote store.
pub struct Consolidator {
    config: Arc<ConsolidationConfig>,
    scanner: PartitionScanner,
    sweeper: CorruptionSweeper,
    planner: ConsolidationPlanner,
    fetcher: ParallelFetcher,
    merger: Merger,
    publisher: Publisher,
    reaper: SourceReaper,
    metrics: Arc<ConsolidationMetrics>,
    shutdown: ShutdownSignal,
}

impl Consolidator {
    pub fn new(
        config: ConsolidationConfig,
        store: Arc<dyn RemoteStore>,
        metrics: Arc<ConsolidationMetrics>,
        shutdown: ShutdownSignal,
    ) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let caller = Identity::from_user(config.caller_identity.as_deref());

        Ok(Self {
            scanner: PartitionScanner::new(store.clone(), config.clone()),
            sweeper: CorruptionSweeper::new(store.clone(), &config),
            planner: ConsolidationPlanner::new(&config),
            fetcher: ParallelFetcher::new(store.clone(), config.parallel_downloads, caller),
            merger: Merger::new(MergerConfig::from_config(&config)),
            publisher: Publisher::new(store.clone(), config.clone()),
            reaper: SourceReaper::new(store, &config),
            config,
            metrics,
            shutdown,
        })
    }

    pub fn config(&self) -> &ConsolidationConfig {
        &self.config
    }

    /// Processes the dates in order. A failed date never stops the batch; a
    /// shutdown marks the remaining dates as not run.
    pub async fn run_batch(&self, dates: &[NaiveDate], dry_run: bool) -> BatchSummary {
        let _timer = Timer::processing(self.metrics.clone());
        let mut summary = BatchSummary::default();

        tracing::info!(dates = dates.len(), dry_run, "Starting consolidation");

        for &date in dates {
            if self.shutdown.is_triggered() {
                tracing::warn!(date = %date, "Skipping date, shutdown requested");
                self.metrics.record_date(false);
                summary.reports.push(DateReport::not_run(date, dry_run));
                continue;
            }
            summary.reports.push(self.consolidate_date(date, dry_run).await);
        }

        summary.log();
        summary
    }

    /// Processes one date. Never fails; the outcome is in the report.
    pub async fn consolidate_date(&self, date: NaiveDate, dry_run: bool) -> DateReport {
        let started = Instant::now();
        let mut report = DateReport::new(date, dry_run);

        let outcome = AssertUnwindSafe(self.run_date(date, dry_run, &mut report))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(outcome)) => report.outcome = outcome,
            Ok(Err(e)) => {
                report.outcome = DateOutcome::Failed;
                report.error = Some(e.to_string());
            }
            Err(panic) => {
                report.outcome = DateOutcome::Failed;
                report.error = Some(format!("panicked: {}", panic_message(&*panic)));
            }
        }

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        self.metrics.record_date(report.succeeded());
        report.log();
        report
    }

    #[tracing::instrument(skip_all, fields(date = %date, dry_run))]
    async fn run_date(
        &self,
        date: NaiveDate,
        dry_run: bool,
        report: &mut DateReport,
    ) -> Result<DateOutcome> {
        self.checkpoint("scan")?;
        let snapshot = self.scanner.scan(date).await;
        self.metrics.record_scan(snapshot.len() as u64);
        report.files_found = snapshot.len();
        report.total_bytes = snapshot.total_bytes;

        let preliminary = self.planner.plan(&snapshot);
        if !preliminary.eligible {
            report.sweep.candidates = self.sweeper.candidates(&snapshot).len();
            return Ok(self.not_eligible(&preliminary, report));
        }

        self.checkpoint("sweep")?;
        let (sweep, snapshot) = self.sweeper.sweep(snapshot, dry_run).await;
        self.metrics.record_swept(sweep.deleted_count() as u64);
        report.sweep = SweepSummary::from(&sweep);

        let plan = self.planner.plan(&snapshot);
        if !plan.eligible {
            return Ok(self.not_eligible(&plan, report));
        }
        self.metrics.record_skipped(plan.skipped_entries.len() as u64);
        report.plan = Some(PlanSummary::from(&plan));

        if dry_run {
            report.analysis = Some(DryRunAnalysis::from_plan(
                &plan,
                self.config.min_files_to_consolidate,
            ));
            return Ok(DateOutcome::DryRun);
        }

        self.checkpoint("staging")?;
        let staging = self.create_staging(date)?;
        let result = self.consolidate_staged(&plan, staging.path(), report).await;
        close_staging(staging);
        result
    }

    /// Fetch, merge, publish and reap, inside an existing staging directory.
    async fn consolidate_staged(
        &self,
        plan: &ConsolidationPlan,
        staging_dir: &Path,
        report: &mut DateReport,
    ) -> Result<DateOutcome> {
        let fetched = self.fetcher.fetch(&plan.eligible_entries, staging_dir).await;
        for result in &fetched.results {
            self.metrics
                .record_download(result.success, result.source_entry.size_bytes);
        }
        report.downloads_succeeded = fetched.success_count();
        report.downloads_failed = fetched.failure_count();

        if fetched.success_count() == 0 {
            return Err(ConsolidationError::RemoteIo(format!(
                "all {} downloads failed",
                fetched.failure_count()
            )));
        }
        if fetched.failure_count() > 0 {
            tracing::warn!(
                failed = fetched.failure_count(),
                succeeded = fetched.success_count(),
                "Some downloads failed; merging the rest, failed files stay for the next run"
            );
        }

        self.checkpoint("merge")?;
        let staged: Vec<StagedFile> = fetched
            .succeeded()
            .map(|r| StagedFile {
                source_entry: r.source_entry.clone(),
                local_path: r.local_path.clone(),
            })
            .collect();
        let merged: MergeResult = self
            .merger
            .merge(staged, staging_dir.join(MERGED_FILE_NAME))
            .await?;
        self.metrics.record_rows_merged(merged.row_count);
        report.rows_merged = Some(merged.row_count);

        self.checkpoint("publish")?;
        let receipt = self.publisher.publish(&merged, plan.date).await?;
        self.metrics.record_published(receipt.size_bytes());
        report.published_path = Some(receipt.remote_path().to_string());

        // Reap always follows a successful publish, even during shutdown
        let reaped = self.reaper.reap(&merged.merged_entries, &receipt).await;
        self.metrics
            .record_reap(reaped.deleted.len() as u64, reaped.failures.len() as u64);
        report.reap = Some(ReapSummary::from(&reaped));
        if let Some(warning) = reaped.warning() {
            if warning.is_fatal_for_date() {
                return Err(warning);
            }
            tracing::warn!("{}", warning);
            report.warnings.push(warning.to_string());
        }

        Ok(DateOutcome::Consolidated)
    }

    fn not_eligible(&self, plan: &ConsolidationPlan, report: &mut DateReport) -> DateOutcome {
        tracing::info!(
            eligible_files = plan.eligible_entries.len(),
            min_files = self.config.min_files_to_consolidate,
            "Not enough files to consolidate"
        );
        self.metrics.record_skipped(plan.skipped_entries.len() as u64);
        report.plan = Some(PlanSummary::from(plan));
        DateOutcome::NotEligible
    }

    fn checkpoint(&self, phase: &str) -> Result<()> {
        if self.shutdown.is_triggered() {
            return Err(ConsolidationError::Cancelled(format!(
                "shutdown requested before {}",
                phase
            )));
        }
        Ok(())
    }

    fn create_staging(&self, date: NaiveDate) -> Result<TempDir> {
        let root = &self.config.staging_root;
        std::fs::create_dir_all(root).map_err(|e| {
            ConsolidationError::Staging(format!("cannot create {}: {}", root.display(), e))
        })?;

        let staging = tempfile::Builder::new()
            .prefix(&format!("consolidation_{}_", date))
            .tempdir_in(root)
            .map_err(|e| {
                ConsolidationError::Staging(format!("cannot create staging dir: {}", e))
            })?;

        tracing::debug!(path = %staging.path().display(), "Created staging directory");
        Ok(staging)
    }
}

fn close_staging(staging: TempDir) {
    let path = staging.path().to_path_buf();
    match staging.close() {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed staging directory"),
        Err(e) => tracing::warn!(path = %path.display(), "Failed to remove staging directory: {}", e),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
