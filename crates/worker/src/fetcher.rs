/*
 * Parallel Fetcher
 *
 * Downloads eligible files into the staging directory with a bounded pool of
 * workers. Each worker owns its local path and reports one DownloadResult on
 * a channel; a failed download never cancels its siblings.
 */

use consolidation_common::{FileEntry, Identity, RemoteStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};

/// Outcome of downloading one source file.
#[derive(Debug, Clone)]
pub struct DownloadResult {
    pub source_entry: FileEntry,
    pub local_path: PathBuf,
    pub success: bool,
    pub error: Option<String>,
}

/// All download outcomes of one fetch, in completion order.
#[derive(Debug, Clone, Default)]
pub struct FetchReport {
    pub results: Vec<DownloadResult>,
}

impl FetchReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &DownloadResult> {
        self.results.iter().filter(|r| r.success)
    }

    pub fn failed(&self) -> impl Iterator<Item = &DownloadResult> {
        self.results.iter().filter(|r| !r.success)
    }

    pub fn success_count(&self) -> usize {
        self.succeeded().count()
    }

    pub fn failure_count(&self) -> usize {
        self.failed().count()
    }

    pub fn downloaded_bytes(&self) -> u64 {
        self.succeeded().map(|r| r.source_entry.size_bytes).sum()
    }
}

/// Bounded-concurrency downloader.
pub struct ParallelFetcher {
    store: Arc<dyn RemoteStore>,
    concurrency: usize,
    identity: Identity,
}

impl ParallelFetcher {
    pub fn new(store: Arc<dyn RemoteStore>, concurrency: usize, identity: Identity) -> Self {
        Self {
            store,
            concurrency: concurrency.max(1),
            identity,
        }
    }

    /// Downloads every entry into `staging_dir`.
    #[tracing::instrument(skip_all, fields(files = entries.len(), concurrency = self.concurrency))]
    pub async fn fetch(&self, entries: &[FileEntry], staging_dir: &Path) -> FetchReport {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let (tx, mut rx) = mpsc::channel::<DownloadResult>(entries.len().max(1));

        for (index, entry) in entries.iter().enumerate() {
            let semaphore = semaphore.clone();
            let store = self.store.clone();
            let identity = self.identity.clone();
            let tx = tx.clone();
            let entry = entry.clone();
            let local_path = staging_dir.join(format!("{:05}_{}", index, entry.file_name()));

            tokio::spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => download(store.as_ref(), entry, local_path, &identity).await,
                    Err(e) => DownloadResult {
                        source_entry: entry,
                        local_path,
                        success: false,
                        error: Some(e.to_string()),
                    },
                };
                // The receiver outlives every sender
                let _ = tx.send(result).await;
            });
        }
        drop(tx);

        let mut report = FetchReport {
            results: Vec::with_capacity(entries.len()),
        };
        while let Some(result) = rx.recv().await {
            report.results.push(result);
        }

        // A panicked worker never reports; account for it as a failure
        if report.results.len() < entries.len() {
            let reported: std::collections::HashSet<&str> = report
                .results
                .iter()
                .map(|r| r.source_entry.path.as_str())
                .collect();
            let missing: Vec<DownloadResult> = entries
                .iter()
                .enumerate()
                .filter(|(_, e)| !reported.contains(e.path.as_str()))
                .map(|(index, e)| DownloadResult {
                    source_entry: e.clone(),
                    local_path: staging_dir.join(format!("{:05}_{}", index, e.file_name())),
                    success: false,
                    error: Some("download worker terminated".to_string()),
                })
                .collect();
            report.results.extend(missing);
        }

        tracing::info!(
            succeeded = report.success_count(),
            failed = report.failure_count(),
            bytes = report.downloaded_bytes(),
            "Fetch complete"
        );
        report
    }
}

async fn download(
    store: &dyn RemoteStore,
    entry: FileEntry,
    local_path: PathBuf,
    identity: &Identity,
) -> DownloadResult {
    match store.get(&entry.path, &local_path, identity).await {
        Ok(()) => {
            tracing::debug!(path = %entry.path, size_bytes = entry.size_bytes, "Downloaded");
            DownloadResult {
                source_entry: entry,
                local_path,
                success: true,
                error: None,
            }
        }
        Err(e) => {
            tracing::warn!(path = %entry.path, error = %e, "Download failed");
            DownloadResult {
                source_entry: entry,
                local_path,
                success: false,
                error: Some(e.to_string()),
            }
        }
    }
}
