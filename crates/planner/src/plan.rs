/*
 * Consolidation planning: the go/no-go decision for one partition.
 */

use chrono::NaiveDate;
use consolidation_common::{ConsolidationConfig, FileEntry, PartitionSnapshot, BYTES_PER_MB};
use serde::Serialize;

/// Decision for one date partition.
///
/// `eligible` is true exactly when `eligible_entries` holds at least
/// `min_files_to_consolidate` files.
#[derive(Debug, Clone, Serialize)]
pub struct ConsolidationPlan {
    pub date: NaiveDate,
    pub eligible_entries: Vec<FileEntry>,
    /// Files below the minimum size, presumed mid-write and left in place
    pub skipped_entries: Vec<FileEntry>,
    pub target_file_count: u64,
    pub eligible: bool,
}

impl ConsolidationPlan {
    pub fn eligible_bytes(&self) -> u64 {
        self.eligible_entries.iter().map(|e| e.size_bytes).sum()
    }

    pub fn eligible_mb(&self) -> f64 {
        self.eligible_bytes() as f64 / BYTES_PER_MB
    }

    /// Mean size of the eligible files, zero when there are none.
    pub fn average_bytes(&self) -> u64 {
        match self.eligible_entries.len() as u64 {
            0 => 0,
            n => self.eligible_bytes() / n,
        }
    }

    /// Integer percentage of files removed by consolidating.
    pub fn reduction_percent(&self) -> u64 {
        let n = self.eligible_entries.len() as u64;
        if n == 0 {
            return 0;
        }
        n.saturating_sub(self.target_file_count) * 100 / n
    }
}

/// Pure planner over a post-sweep snapshot.
#[derive(Debug, Clone)]
pub struct ConsolidationPlanner {
    min_files: usize,
    min_file_size_bytes: u64,
    target_file_size_bytes: u64,
}

impl ConsolidationPlanner {
    pub fn new(config: &ConsolidationConfig) -> Self {
        Self {
            min_files: config.min_files_to_consolidate,
            min_file_size_bytes: config.min_file_size_bytes,
            target_file_size_bytes: config.target_file_size_bytes(),
        }
    }

    pub fn plan(&self, snapshot: &PartitionSnapshot) -> ConsolidationPlan {
        let (eligible_entries, skipped_entries): (Vec<FileEntry>, Vec<FileEntry>) = snapshot
            .entries
            .iter()
            .cloned()
            .partition(|e| e.size_bytes >= self.min_file_size_bytes);

        let total_bytes: u64 = eligible_entries.iter().map(|e| e.size_bytes).sum();
        let target_file_count = self.target_file_count(total_bytes);
        let eligible = eligible_entries.len() >= self.min_files;

        tracing::debug!(
            date = %snapshot.date,
            eligible_files = eligible_entries.len(),
            skipped_files = skipped_entries.len(),
            total_bytes,
            target_file_count,
            eligible,
            "Planned partition"
        );

        ConsolidationPlan {
            date: snapshot.date,
            eligible_entries,
            skipped_entries,
            target_file_count,
            eligible,
        }
    }

    /// `max(1, floor(total / target))`.
    pub fn target_file_count(&self, total_bytes: u64) -> u64 {
        (total_bytes / self.target_file_size_bytes.max(1)).max(1)
    }
}
