/*
 * Per-date and batch reports.
 */

use chrono::NaiveDate;
use consolidation_common::BYTES_PER_MB;
use consolidation_planner::{ConsolidationPlan, SweepReport};
use consolidation_worker::ReapReport;
use serde::Serialize;

/// Number of eligible files listed by name in a dry-run analysis.
const SAMPLE_FILES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DateOutcome {
    /// Merged output published; sources reaped
    Consolidated,
    /// Too few eligible files; nothing was changed
    NotEligible,
    /// Analysis only; nothing was changed
    DryRun,
    Failed,
    /// Not attempted because of shutdown
    NotRun,
}

impl DateOutcome {
    pub fn is_success(self) -> bool {
        matches!(
            self,
            DateOutcome::Consolidated | DateOutcome::NotEligible | DateOutcome::DryRun
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateRating {
    Excellent,
    Good,
    Marginal,
}

impl CandidateRating {
    pub fn for_file_count(files: usize, min_files: usize) -> Self {
        if files > 10 {
            CandidateRating::Excellent
        } else if files > min_files {
            CandidateRating::Good
        } else {
            CandidateRating::Marginal
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanSummary {
    pub eligible_files: usize,
    pub eligible_bytes: u64,
    pub skipped_files: usize,
    pub target_file_count: u64,
    pub eligible: bool,
}

impl From<&ConsolidationPlan> for PlanSummary {
    fn from(plan: &ConsolidationPlan) -> Self {
        Self {
            eligible_files: plan.eligible_entries.len(),
            eligible_bytes: plan.eligible_bytes(),
            skipped_files: plan.skipped_entries.len(),
            target_file_count: plan.target_file_count,
            eligible: plan.eligible,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepSummary {
    pub candidates: usize,
    pub deleted: usize,
    pub failed: usize,
}

impl From<&SweepReport> for SweepSummary {
    fn from(report: &SweepReport) -> Self {
        Self {
            candidates: report.candidates.len(),
            deleted: report.deleted.len(),
            failed: report.failures.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReapSummary {
    pub attempted: usize,
    pub deleted: usize,
    pub failed: usize,
}

impl From<&ReapReport> for ReapSummary {
    fn from(report: &ReapReport) -> Self {
        Self {
            attempted: report.attempted,
            deleted: report.deleted.len(),
            failed: report.failures.len(),
        }
    }
}

/// What a consolidation of this partition would do.
#[derive(Debug, Clone, Serialize)]
pub struct DryRunAnalysis {
    /// First eligible files as `(name, size_bytes)`
    pub sample_files: Vec<(String, u64)>,
    /// Eligible files not shown in `sample_files`
    pub more_files: usize,
    pub average_bytes: u64,
    pub target_file_count: u64,
    pub reduction_percent: u64,
    pub rating: CandidateRating,
}

impl DryRunAnalysis {
    pub fn from_plan(plan: &ConsolidationPlan, min_files: usize) -> Self {
        let sample_files = plan
            .eligible_entries
            .iter()
            .take(SAMPLE_FILES)
            .map(|e| (e.file_name().to_string(), e.size_bytes))
            .collect();

        Self {
            sample_files,
            more_files: plan.eligible_entries.len().saturating_sub(SAMPLE_FILES),
            average_bytes: plan.average_bytes(),
            target_file_count: plan.target_file_count,
            reduction_percent: plan.reduction_percent(),
            rating: CandidateRating::for_file_count(plan.eligible_entries.len(), min_files),
        }
    }
}

/// Outcome of processing one date.
#[derive(Debug, Clone, Serialize)]
pub struct DateReport {
    pub date: NaiveDate,
    pub dry_run: bool,
    pub files_found: usize,
    pub total_bytes: u64,
    pub sweep: SweepSummary,
    pub plan: Option<PlanSummary>,
    pub downloads_succeeded: usize,
    pub downloads_failed: usize,
    pub rows_merged: Option<u64>,
    pub published_path: Option<String>,
    pub reap: Option<ReapSummary>,
    pub analysis: Option<DryRunAnalysis>,
    pub warnings: Vec<String>,
    pub error: Option<String>,
    pub outcome: DateOutcome,
    pub elapsed_ms: u64,
}

impl DateReport {
    pub fn new(date: NaiveDate, dry_run: bool) -> Self {
        Self {
            date,
            dry_run,
            files_found: 0,
            total_bytes: 0,
            sweep: SweepSummary::default(),
            plan: None,
            downloads_succeeded: 0,
            downloads_failed: 0,
            rows_merged: None,
            published_path: None,
            reap: None,
            analysis: None,
            warnings: Vec::new(),
            error: None,
            outcome: DateOutcome::Failed,
            elapsed_ms: 0,
        }
    }

    pub fn not_run(date: NaiveDate, dry_run: bool) -> Self {
        Self {
            outcome: DateOutcome::NotRun,
            error: Some("shutdown requested before start".to_string()),
            ..Self::new(date, dry_run)
        }
    }

    pub fn succeeded(&self) -> bool {
        self.outcome.is_success()
    }

    /// Logs the human-readable summary of this date.
    pub fn log(&self) {
        let total_mb = self.total_bytes as f64 / BYTES_PER_MB;

        if let Some(analysis) = &self.analysis {
            tracing::info!(date = %self.date, "DRY RUN analysis");
            for (name, size) in &analysis.sample_files {
                tracing::info!(date = %self.date, "  {} ({:.2} KB)", name, *size as f64 / 1024.0);
            }
            if analysis.more_files > 0 {
                tracing::info!(date = %self.date, "  ... and {} more files", analysis.more_files);
            }
            tracing::info!(
                date = %self.date,
                average_kb = analysis.average_bytes as f64 / 1024.0,
                target_files = analysis.target_file_count,
                reduction_percent = analysis.reduction_percent,
                rating = ?analysis.rating,
                "Would consolidate"
            );
        }

        match self.outcome {
            DateOutcome::Failed | DateOutcome::NotRun => tracing::error!(
                date = %self.date,
                files = self.files_found,
                total_mb,
                outcome = ?self.outcome,
                error = self.error.as_deref().unwrap_or("unknown"),
                elapsed_ms = self.elapsed_ms,
                "Date failed"
            ),
            _ => tracing::info!(
                date = %self.date,
                files = self.files_found,
                total_mb,
                swept = self.sweep.deleted,
                eligible = self.plan.as_ref().map(|p| p.eligible_files).unwrap_or(0),
                rows = self.rows_merged.unwrap_or(0),
                published = self.published_path.as_deref().unwrap_or("-"),
                outcome = ?self.outcome,
                elapsed_ms = self.elapsed_ms,
                "Date complete"
            ),
        }
    }
}

/// Result of a multi-date run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub reports: Vec<DateReport>,
}

impl BatchSummary {
    pub fn succeeded(&self) -> usize {
        self.reports.iter().filter(|r| r.succeeded()).count()
    }

    pub fn total(&self) -> usize {
        self.reports.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.succeeded() == self.total()
    }

    /// Process exit code: 0 when every requested date succeeded.
    pub fn exit_code(&self) -> i32 {
        if self.all_succeeded() {
            0
        } else {
            1
        }
    }

    pub fn log(&self) {
        let failed: Vec<String> = self
            .reports
            .iter()
            .filter(|r| !r.succeeded())
            .map(|r| r.date.to_string())
            .collect();

        if failed.is_empty() {
            tracing::info!("Consolidation complete: {}/{} dates succeeded", self.succeeded(), self.total());
        } else {
            tracing::warn!(
                failed_dates = %failed.join(","),
                "Consolidation complete: {}/{} dates succeeded",
                self.succeeded(),
                self.total()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use consolidation_common::{ConsolidationConfig, FileEntry, PartitionSnapshot};
    use consolidation_planner::ConsolidationPlanner;

    fn plan(files: usize, size: u64) -> ConsolidationPlan {
        let date = NaiveDate::from_ymd_opt(2025, 8, 15).unwrap();
        let entries = (0..files)
            .map(|i| FileEntry::new(format!("/p/telemetry-{:03}.parquet", i), size, date))
            .collect();
        ConsolidationPlanner::new(&ConsolidationConfig::default())
            .plan(&PartitionSnapshot::new(date, entries))
    }

    #[test]
    fn test_rating() {
        assert_eq!(CandidateRating::for_file_count(47, 5), CandidateRating::Excellent);
        assert_eq!(CandidateRating::for_file_count(11, 5), CandidateRating::Excellent);
        assert_eq!(CandidateRating::for_file_count(10, 5), CandidateRating::Good);
        assert_eq!(CandidateRating::for_file_count(6, 5), CandidateRating::Good);
        assert_eq!(CandidateRating::for_file_count(5, 5), CandidateRating::Marginal);
    }

    #[test]
    fn test_dry_run_analysis() {
        let analysis = DryRunAnalysis::from_plan(&plan(47, 36_000), 5);

        assert_eq!(analysis.sample_files.len(), 5);
        assert_eq!(analysis.sample_files[0].0, "telemetry-000.parquet");
        assert_eq!(analysis.more_files, 42);
        assert_eq!(analysis.average_bytes, 36_000);
        assert_eq!(analysis.target_file_count, 1);
        assert_eq!(analysis.reduction_percent, 97);
        assert_eq!(analysis.rating, CandidateRating::Excellent);
    }

    #[test]
    fn test_batch_exit_code() {
        let date = NaiveDate::from_ymd_opt(2025, 8, 15).unwrap();
        let mut ok = DateReport::new(date, false);
        ok.outcome = DateOutcome::NotEligible;
        let mut summary = BatchSummary {
            reports: vec![ok.clone(), ok],
        };
        assert_eq!(summary.exit_code(), 0);

        summary.reports.push(DateReport::not_run(date, false));
        assert_eq!(summary.succeeded(), 2);
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.exit_code(), 1);
    }
}
