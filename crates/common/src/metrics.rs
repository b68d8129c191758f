/*
 * Observability - Metrics
 *
 * Counters for every consolidation phase, exportable in the Prometheus text
 * exposition format (node-exporter textfile collector).
 */

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Process-wide consolidation counters, shared via `Arc`.
#[derive(Debug, Default)]
pub struct ConsolidationMetrics {
    // Scan / plan
    pub partitions_scanned: AtomicU64,
    pub files_listed: AtomicU64,
    pub files_swept: AtomicU64,
    pub files_skipped: AtomicU64,

    // Transfer
    pub files_downloaded: AtomicU64,
    pub download_failures: AtomicU64,
    pub bytes_downloaded: AtomicU64,

    // Merge / publish / reap
    pub rows_merged: AtomicU64,
    pub files_published: AtomicU64,
    pub bytes_published: AtomicU64,
    pub files_reaped: AtomicU64,
    pub reap_failures: AtomicU64,

    // Dates
    pub dates_succeeded: AtomicU64,
    pub dates_failed: AtomicU64,

    // Timing (in microseconds)
    pub total_processing_time_us: AtomicU64,
}

impl ConsolidationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_scan(&self, files: u64) {
        self.partitions_scanned.fetch_add(1, Ordering::Relaxed);
        self.files_listed.fetch_add(files, Ordering::Relaxed);
    }

    pub fn record_swept(&self, files: u64) {
        self.files_swept.fetch_add(files, Ordering::Relaxed);
    }

    pub fn record_skipped(&self, files: u64) {
        self.files_skipped.fetch_add(files, Ordering::Relaxed);
    }

    /// Records one download outcome.
    pub fn record_download(&self, success: bool, bytes: u64) {
        if success {
            self.files_downloaded.fetch_add(1, Ordering::Relaxed);
            self.bytes_downloaded.fetch_add(bytes, Ordering::Relaxed);
        } else {
            self.download_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_rows_merged(&self, rows: u64) {
        self.rows_merged.fetch_add(rows, Ordering::Relaxed);
    }

    pub fn record_published(&self, bytes: u64) {
        self.files_published.fetch_add(1, Ordering::Relaxed);
        self.bytes_published.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_reap(&self, deleted: u64, failed: u64) {
        self.files_reaped.fetch_add(deleted, Ordering::Relaxed);
        self.reap_failures.fetch_add(failed, Ordering::Relaxed);
    }

    /// Records a finished date.
    pub fn record_date(&self, success: bool) {
        if success {
            self.dates_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.dates_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_processing_time(&self, duration: Duration) {
        self.total_processing_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Returns a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            partitions_scanned: self.partitions_scanned.load(Ordering::Relaxed),
            files_listed: self.files_listed.load(Ordering::Relaxed),
            files_swept: self.files_swept.load(Ordering::Relaxed),
            files_skipped: self.files_skipped.load(Ordering::Relaxed),
            files_downloaded: self.files_downloaded.load(Ordering::Relaxed),
            download_failures: self.download_failures.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
            rows_merged: self.rows_merged.load(Ordering::Relaxed),
            files_published: self.files_published.load(Ordering::Relaxed),
            bytes_published: self.bytes_published.load(Ordering::Relaxed),
            files_reaped: self.files_reaped.load(Ordering::Relaxed),
            reap_failures: self.reap_failures.load(Ordering::Relaxed),
            dates_succeeded: self.dates_succeeded.load(Ordering::Relaxed),
            dates_failed: self.dates_failed.load(Ordering::Relaxed),
            total_processing_time_us: self.total_processing_time_us.load(Ordering::Relaxed),
        }
    }

    /// Formats metrics as Prometheus exposition format.
    pub fn to_prometheus(&self) -> String {
        let snap = self.snapshot();
        format!(
            r#"# HELP consolidation_partitions_scanned Date partitions scanned
# TYPE consolidation_partitions_scanned counter
consolidation_partitions_scanned {}

# HELP consolidation_files_total Source files by stage
# TYPE consolidation_files_total counter
consolidation_files_total{{stage="listed"}} {}
consolidation_files_total{{stage="swept"}} {}
consolidation_files_total{{stage="skipped"}} {}
consolidation_files_total{{stage="downloaded"}} {}
consolidation_files_total{{stage="download_failed"}} {}
consolidation_files_total{{stage="reaped"}} {}
consolidation_files_total{{stage="reap_failed"}} {}

# HELP consolidation_bytes_total Bytes transferred
# TYPE consolidation_bytes_total counter
consolidation_bytes_total{{direction="downloaded"}} {}
consolidation_bytes_total{{direction="published"}} {}

# HELP consolidation_rows_merged Rows written to consolidated files
# TYPE consolidation_rows_merged counter
consolidation_rows_merged {}

# HELP consolidation_files_published Consolidated files published
# TYPE consolidation_files_published counter
consolidation_files_published {}

# HELP consolidation_dates_total Processed dates by outcome
# TYPE consolidation_dates_total counter
consolidation_dates_total{{outcome="succeeded"}} {}
consolidation_dates_total{{outcome="failed"}} {}

# HELP consolidation_processing_time_seconds Total processing time
# TYPE consolidation_processing_time_seconds counter
consolidation_processing_time_seconds {}
"#,
            snap.partitions_scanned,
            snap.files_listed,
            snap.files_swept,
            snap.files_skipped,
            snap.files_downloaded,
            snap.download_failures,
            snap.files_reaped,
            snap.reap_failures,
            snap.bytes_downloaded,
            snap.bytes_published,
            snap.rows_merged,
            snap.files_published,
            snap.dates_succeeded,
            snap.dates_failed,
            snap.total_processing_time_us as f64 / 1_000_000.0,
        )
    }
}

/// A point-in-time snapshot of metrics.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub partitions_scanned: u64,
    pub files_listed: u64,
    pub files_swept: u64,
    pub files_skipped: u64,
    pub files_downloaded: u64,
    pub download_failures: u64,
    pub bytes_downloaded: u64,
    pub rows_merged: u64,
    pub files_published: u64,
    pub bytes_published: u64,
    pub files_reaped: u64,
    pub reap_failures: u64,
    pub dates_succeeded: u64,
    pub dates_failed: u64,
    pub total_processing_time_us: u64,
}

impl MetricsSnapshot {
    /// Fraction of finished dates that succeeded.
    pub fn success_rate(&self) -> f64 {
        let total = self.dates_succeeded + self.dates_failed;
        if total == 0 {
            1.0
        } else {
            self.dates_succeeded as f64 / total as f64
        }
    }

    /// Files removed from the partitions per file published.
    pub fn file_reduction(&self) -> f64 {
        if self.files_published == 0 {
            0.0
        } else {
            (self.files_reaped + self.files_swept) as f64 / self.files_published as f64
        }
    }
}

/// Timer guard that records processing time on drop.
pub struct Timer {
    start: Instant,
    metrics: Arc<ConsolidationMetrics>,
}

impl Timer {
    pub fn processing(metrics: Arc<ConsolidationMetrics>) -> Self {
        Self {
            start: Instant::now(),
            metrics,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.metrics.record_processing_time(self.start.elapsed());
    }
}
