/*
 * Partition data model: the files of one date partition as listed from the
 * remote store.
 *
 * Entries are created fresh for every run and never persisted.
 */

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashSet;

pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// A single remote file belonging to a date partition. Identity is `path`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FileEntry {
    /// Full remote path
    pub path: String,
    /// File size in bytes
    pub size_bytes: u64,
    /// Date partition the file was listed under
    pub partition_date: NaiveDate,
}

impl FileEntry {
    pub fn new(path: impl Into<String>, size_bytes: u64, partition_date: NaiveDate) -> Self {
        Self {
            path: path.into(),
            size_bytes,
            partition_date,
        }
    }

    /// Final path component.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / BYTES_PER_MB
    }
}

/// The eligible-looking files of one date partition at scan time.
#[derive(Debug, Clone, Serialize)]
pub struct PartitionSnapshot {
    pub date: NaiveDate,
    /// Entries in listing order
    pub entries: Vec<FileEntry>,
    pub total_bytes: u64,
}

impl PartitionSnapshot {
    pub fn new(date: NaiveDate, entries: Vec<FileEntry>) -> Self {
        let total_bytes = entries.iter().map(|e| e.size_bytes).sum();
        Self {
            date,
            entries,
            total_bytes,
        }
    }

    /// A partition with no files (also used when listing fails).
    pub fn empty(date: NaiveDate) -> Self {
        Self::new(date, Vec::new())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_mb(&self) -> f64 {
        self.total_bytes as f64 / BYTES_PER_MB
    }

    /// Returns the snapshot with the given paths removed.
    pub fn without(self, removed: &HashSet<String>) -> Self {
        if removed.is_empty() {
            return self;
        }
        let entries = self
            .entries
            .into_iter()
            .filter(|e| !removed.contains(&e.path))
            .collect();
        Self::new(self.date, entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 8, 15).unwrap()
    }

    #[test]
    fn test_snapshot_totals() {
        let snapshot = PartitionSnapshot::new(
            date(),
            vec![
                FileEntry::new("/d/date=2025-08-15/telemetry-a.parquet", 1000, date()),
                FileEntry::new("/d/date=2025-08-15/telemetry-b.parquet", 2500, date()),
            ],
        );
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.total_bytes, 3500);
        assert_eq!(snapshot.entries[1].file_name(), "telemetry-b.parquet");
    }

    #[test]
    fn test_without_recomputes_total() {
        let snapshot = PartitionSnapshot::new(
            date(),
            vec![
                FileEntry::new("/p/telemetry-a.parquet", 10, date()),
                FileEntry::new("/p/telemetry-b.parquet", 90, date()),
            ],
        );
        let removed: HashSet<String> = ["/p/telemetry-a.parquet".to_string()].into();
        let after = snapshot.without(&removed);
        assert_eq!(after.len(), 1);
        assert_eq!(after.total_bytes, 90);
    }
}
