/*
 * Publisher
 *
 * Uploads a verified merge result into its partition under a
 * generation-stamped name that never collides with earlier outputs, so an
 * upload never has to overwrite.
 */

use chrono::{NaiveDate, NaiveDateTime, Utc};
use consolidation_common::{ConsolidationConfig, Identity, RemoteStore, Result, ResultExt};
use std::sync::Arc;
use uuid::Uuid;

use crate::merger::MergeResult;

/// Proof that a consolidated file was uploaded. Only the publisher creates
/// one, and the reaper requires one.
#[derive(Debug, Clone)]
pub struct PublishReceipt {
    remote_path: String,
    size_bytes: u64,
    row_count: u64,
}

impl PublishReceipt {
    pub(crate) fn new(remote_path: String, size_bytes: u64, row_count: u64) -> Self {
        Self {
            remote_path,
            size_bytes,
            row_count,
        }
    }

    pub fn remote_path(&self) -> &str {
        &self.remote_path
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn row_count(&self) -> u64 {
        self.row_count
    }
}

/// Uploads consolidated output under the service identity.
pub struct Publisher {
    store: Arc<dyn RemoteStore>,
    config: Arc<ConsolidationConfig>,
    identity: Identity,
}

impl Publisher {
    pub fn new(store: Arc<dyn RemoteStore>, config: Arc<ConsolidationConfig>) -> Self {
        let identity = Identity::from_user(config.service_identity.as_deref());
        Self {
            store,
            config,
            identity,
        }
    }

    /// `<prefix><date>-<marker>-<YYYYMMDDTHHMMSS>-<8 hex>.parquet`
    pub fn output_name(&self, date: NaiveDate, generated_at: NaiveDateTime) -> String {
        let simple = Uuid::now_v7().simple().to_string();
        // The leading hex digits of a v7 id are the timestamp
        let suffix = &simple[simple.len() - 8..];
        format!(
            "{}{}-{}-{}-{}{}",
            self.config.file_prefix,
            date.format("%Y-%m-%d"),
            self.config.consolidated_marker,
            generated_at.format("%Y%m%dT%H%M%S"),
            suffix,
            self.config.file_extension
        )
    }

    /// Uploads `merged` into the partition of `date`.
    #[tracing::instrument(skip_all, fields(date = %date))]
    pub async fn publish(&self, merged: &MergeResult, date: NaiveDate) -> Result<PublishReceipt> {
        let name = self.output_name(date, Utc::now().naive_utc());
        let remote_path = format!("{}/{}", self.config.partition_path(date), name);

        self.store
            .put(&merged.output_path, &remote_path, &self.identity)
            .await
            .with_context(|| format!("publishing {}", remote_path))?;

        tracing::info!(
            path = %remote_path,
            size_bytes = merged.size_bytes,
            rows = merged.row_count,
            identity = %self.identity,
            "Published consolidated file"
        );

        Ok(PublishReceipt::new(
            remote_path,
            merged.size_bytes,
            merged.row_count,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use consolidation_common::remote::OpendalStore;
    use consolidation_common::{build_operator, StorageConfig};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 8, 15).unwrap()
    }

    #[test]
    fn test_output_name_format() {
        let root = tempfile::tempdir().unwrap();
        let store = Arc::new(OpendalStore::new(
            build_operator(&StorageConfig::local(root.path().to_string_lossy())).unwrap(),
        ));
        let publisher = Publisher::new(store, Arc::new(ConsolidationConfig::default()));

        let at = NaiveDate::from_ymd_opt(2025, 8, 16)
            .unwrap()
            .and_hms_opt(1, 2, 3)
            .unwrap();
        let name = publisher.output_name(date(), at);

        assert!(name.starts_with("telemetry-2025-08-15-consolidated-20250816T010203-"));
        assert!(name.ends_with(".parquet"));
        let suffix = name
            .trim_start_matches("telemetry-2025-08-15-consolidated-20250816T010203-")
            .trim_end_matches(".parquet");
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));

        assert_ne!(name, publisher.output_name(date(), at));
    }

    #[tokio::test]
    async fn test_publish_uploads_into_partition() {
        let root = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        let local = staging.path().join("merged.parquet");
        std::fs::write(&local, b"PAR1 fake").unwrap();

        let store = Arc::new(OpendalStore::new(
            build_operator(&StorageConfig::local(root.path().to_string_lossy())).unwrap(),
        ));
        let config = Arc::new(ConsolidationConfig {
            base_path: "/lake".to_string(),
            ..Default::default()
        });
        let publisher = Publisher::new(store, config);

        let merged = MergeResult {
            output_path: local,
            row_count: 42,
            size_bytes: 9,
            merged_entries: vec![],
        };
        let receipt = publisher.publish(&merged, date()).await.unwrap();

        assert!(receipt.remote_path().starts_with("/lake/date=2025-08-15/telemetry-2025-08-15-consolidated-"));
        assert_eq!(receipt.row_count(), 42);
        let on_disk = root.path().join(receipt.remote_path().trim_start_matches('/'));
        assert_eq!(std::fs::read(on_disk).unwrap(), b"PAR1 fake");
    }
}
