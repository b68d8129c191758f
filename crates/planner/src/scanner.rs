/*
 * Partition scanning.
 *
 * One listing call per partition returns every file with its size. Entries
 * are filtered to the source naming convention, and consolidated outputs are
 * excluded so they are never merged again.
 */

use chrono::NaiveDate;
use consolidation_common::{
    ConsolidationConfig, FileEntry, Identity, PartitionSnapshot, RemoteEntry, RemoteStore,
};
use std::sync::Arc;

/// Lists date partitions and builds their snapshots.
pub struct PartitionScanner {
    store: Arc<dyn RemoteStore>,
    config: Arc<ConsolidationConfig>,
    identity: Identity,
}

impl PartitionScanner {
    pub fn new(store: Arc<dyn RemoteStore>, config: Arc<ConsolidationConfig>) -> Self {
        let identity = Identity::from_user(config.caller_identity.as_deref());
        Self {
            store,
            config,
            identity,
        }
    }

    /// Scans the partition for `date`.
    ///
    /// A failed listing is logged and yields an empty snapshot, so later
    /// stages skip the partition without failing the run.
    #[tracing::instrument(skip_all, fields(date = %date))]
    pub async fn scan(&self, date: NaiveDate) -> PartitionSnapshot {
        let dir = self.config.partition_path(date);

        let listing = match self.store.list(&dir, &self.identity).await {
            Ok(listing) => listing,
            Err(e) => {
                tracing::warn!(path = %dir, error = %e, "Listing failed, treating partition as empty");
                return PartitionSnapshot::empty(date);
            }
        };

        let listed = listing.len();
        let entries: Vec<FileEntry> = listing
            .into_iter()
            .filter(|entry| self.is_source_file(entry))
            .map(|entry| FileEntry::new(entry.path, entry.size_bytes, date))
            .collect();

        let snapshot = PartitionSnapshot::new(date, entries);
        tracing::info!(
            listed,
            files = snapshot.len(),
            total_bytes = snapshot.total_bytes,
            "Scanned partition {}",
            dir
        );
        snapshot
    }

    /// Source files match `<prefix>*<extension>` and carry no consolidated marker.
    fn is_source_file(&self, entry: &RemoteEntry) -> bool {
        let name = entry.path.rsplit('/').next().unwrap_or(&entry.path);
        name.starts_with(&self.config.file_prefix)
            && name.ends_with(&self.config.file_extension)
            && !name.contains(&self.config.consolidated_marker)
    }
}
