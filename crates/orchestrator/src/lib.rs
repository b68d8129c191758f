/*
 * Parquet Consolidation - Orchestrator
 *
 * Sequences scanning, sweeping, planning, fetching, merging, publishing and
 * reaping for each requested date partition, and aggregates the per-date
 * outcomes into a batch result.
 */

pub mod orchestrator;
pub mod report;
pub mod settings;
pub mod shutdown;

pub use orchestrator::{dates_ending_at, Consolidator};
pub use report::{
    BatchSummary, CandidateRating, DateOutcome, DateReport, DryRunAnalysis, PlanSummary,
    ReapSummary, SweepSummary,
};
pub use settings::AppSettings;
pub use shutdown::ShutdownSignal;
