/*
 * Corruption sweeping.
 *
 * Files at or below the cleanup threshold are left behind by failed or
 * in-progress writes. They are deleted before planning, or only reported
 * under dry-run. The cleanup threshold is always below the planning minimum,
 * so files between the two are kept and merely skipped by the planner.
 */

use consolidation_common::{ConsolidationConfig, FileEntry, Identity, PartitionSnapshot, RemoteStore};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

/// A sweep candidate whose deletion failed.
#[derive(Debug, Clone, Serialize)]
pub struct SweepFailure {
    pub path: String,
    pub reason: String,
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    /// Entries at or below the cleanup threshold
    pub candidates: Vec<FileEntry>,
    /// Paths actually deleted (empty under dry-run)
    pub deleted: Vec<String>,
    pub failures: Vec<SweepFailure>,
    pub dry_run: bool,
}

impl SweepReport {
    pub fn deleted_count(&self) -> usize {
        self.deleted.len()
    }
}

/// Deletes near-empty files from a partition snapshot.
pub struct CorruptionSweeper {
    store: Arc<dyn RemoteStore>,
    threshold_bytes: u64,
    identity: Identity,
}

impl CorruptionSweeper {
    pub fn new(store: Arc<dyn RemoteStore>, config: &ConsolidationConfig) -> Self {
        Self {
            store,
            threshold_bytes: config.cleanup_threshold_bytes,
            identity: Identity::from_user(config.service_identity.as_deref()),
        }
    }

    /// Entries of `snapshot` that qualify as corrupted.
    pub fn candidates(&self, snapshot: &PartitionSnapshot) -> Vec<FileEntry> {
        snapshot
            .entries
            .iter()
            .filter(|e| e.size_bytes <= self.threshold_bytes)
            .cloned()
            .collect()
    }

    /// Sweeps the snapshot and returns the report with the post-sweep snapshot.
    ///
    /// Each deletion is independent; a failed delete is recorded and the file
    /// stays in the returned snapshot.
    #[tracing::instrument(skip(self, snapshot), fields(date = %snapshot.date))]
    pub async fn sweep(
        &self,
        snapshot: PartitionSnapshot,
        dry_run: bool,
    ) -> (SweepReport, PartitionSnapshot) {
        let mut report = SweepReport {
            candidates: self.candidates(&snapshot),
            dry_run,
            ..Default::default()
        };

        if report.candidates.is_empty() {
            return (report, snapshot);
        }

        if dry_run {
            for entry in &report.candidates {
                tracing::info!(
                    path = %entry.path,
                    size_bytes = entry.size_bytes,
                    "Would delete corrupted file"
                );
            }
            return (report, snapshot);
        }

        for entry in &report.candidates {
            match self.store.delete(&entry.path, &self.identity).await {
                Ok(()) => {
                    tracing::info!(path = %entry.path, size_bytes = entry.size_bytes, "Deleted corrupted file");
                    report.deleted.push(entry.path.clone());
                }
                Err(e) => {
                    tracing::warn!(path = %entry.path, error = %e, "Failed to delete corrupted file");
                    report.failures.push(SweepFailure {
                        path: entry.path.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            candidates = report.candidates.len(),
            deleted = report.deleted.len(),
            failed = report.failures.len(),
            "Sweep complete"
        );

        let removed: HashSet<String> = report.deleted.iter().cloned().collect();
        let snapshot = snapshot.without(&removed);
        (report, snapshot)
    }
}
