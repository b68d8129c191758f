/*
 * Source Reaper
 *
 * Removes the original files that went into a published merge. Deletes are
 * independent and best-effort: failures are counted, never retried, and
 * never undo the publish. A surviving original is retried by the next run.
 */

use consolidation_common::{ConsolidationConfig, ConsolidationError, FileEntry, Identity, RemoteStore};
use futures::stream::{self, StreamExt};
use std::sync::Arc;

use crate::publisher::PublishReceipt;

#[derive(Debug, Clone)]
pub struct ReapFailure {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct ReapReport {
    pub attempted: usize,
    pub deleted: Vec<String>,
    pub failures: Vec<ReapFailure>,
}

impl ReapReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// The warning to record when some originals survived.
    pub fn warning(&self) -> Option<ConsolidationError> {
        if self.is_complete() {
            None
        } else {
            Some(ConsolidationError::PartialReap {
                failed: self.failures.len(),
                attempted: self.attempted,
            })
        }
    }
}

pub struct SourceReaper {
    store: Arc<dyn RemoteStore>,
    concurrency: usize,
    identity: Identity,
}

impl SourceReaper {
    pub fn new(store: Arc<dyn RemoteStore>, config: &ConsolidationConfig) -> Self {
        Self {
            store,
            concurrency: config.parallel_downloads.max(1),
            identity: Identity::from_user(config.service_identity.as_deref()),
        }
    }

    /// Deletes `merged` sources. Requires the receipt of the publish that
    /// contains their rows.
    #[tracing::instrument(skip_all, fields(published = %receipt.remote_path(), files = merged.len()))]
    pub async fn reap(&self, merged: &[FileEntry], receipt: &PublishReceipt) -> ReapReport {
        let outcomes: Vec<(String, Result<(), String>)> = stream::iter(merged.iter())
            .map(|entry| async move {
                let outcome = self
                    .store
                    .delete(&entry.path, &self.identity)
                    .await
                    .map_err(|e| e.to_string());
                (entry.path.clone(), outcome)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = ReapReport {
            attempted: merged.len(),
            ..Default::default()
        };
        for (path, outcome) in outcomes {
            match outcome {
                Ok(()) => report.deleted.push(path),
                Err(reason) => {
                    tracing::warn!(path = %path, error = %reason, "Failed to remove source file");
                    report.failures.push(ReapFailure { path, reason });
                }
            }
        }

        tracing::info!(
            deleted = report.deleted.len(),
            failed = report.failures.len(),
            "Reaped source files"
        );
        report
    }
}
