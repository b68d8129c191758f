/*
 * Parquet Consolidation - Planner
 *
 * The planner is responsible for:
 * 1. Scanning a date partition for candidate source files
 * 2. Sweeping near-empty files left behind by failed writes
 * 3. Deciding whether the partition is worth consolidating
 */

pub mod plan;
pub mod scanner;
pub mod sweeper;

#[cfg(test)]
pub(crate) mod test_support;

pub use plan::{ConsolidationPlan, ConsolidationPlanner};
pub use scanner::PartitionScanner;
pub use sweeper::{CorruptionSweeper, SweepFailure, SweepReport};
