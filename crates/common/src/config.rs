/*
 * Configuration for partition consolidation.
 *
 * One immutable value is built at startup and handed to every component.
 */

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryConfig;
use crate::storage::StorageConfig;
use crate::{ConsolidationError, Result};

const MEGABYTE: u64 = 1024 * 1024;

/// Configuration for the consolidation workflow.
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
#[builder(setter(into), default)]
#[serde(default)]
pub struct ConsolidationConfig {
    /// Root of the partitioned dataset; partitions live at `<base_path>/date=<YYYY-MM-DD>`
    pub base_path: String,

    /// Name prefix every source file carries (default: "telemetry-")
    pub file_prefix: String,

    /// Extension every source file carries (default: ".parquet")
    pub file_extension: String,

    /// Name marker for files produced by a previous consolidation
    pub consolidated_marker: String,

    /// Target size of a consolidated file (default: 128MB)
    pub target_file_size_mb: u64,

    /// Minimum eligible file count before a partition is consolidated
    pub min_files_to_consolidate: usize,

    /// Files below this size are presumed mid-write and left alone (default: 4KB)
    pub min_file_size_bytes: u64,

    /// Files at or below this size are treated as corrupted and swept (default: 1KB)
    pub cleanup_threshold_bytes: u64,

    /// Concurrent downloads during the fetch phase
    pub parallel_downloads: usize,

    /// Local directory under which per-date staging directories are created
    pub staging_root: PathBuf,

    /// Maximum rows per row group in the consolidated file
    pub row_group_size: usize,

    /// Compression codec for the consolidated file
    pub compression: OutputCompression,

    /// Identity used for reads; `None` runs as the ambient user
    pub caller_identity: Option<String>,

    /// Identity used for publish and delete (cross-owner writes)
    pub service_identity: Option<String>,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            base_path: "/insurance-megacorp/telemetry-data-v2".to_string(),
            file_prefix: "telemetry-".to_string(),
            file_extension: ".parquet".to_string(),
            consolidated_marker: "consolidated".to_string(),
            target_file_size_mb: 128,
            min_files_to_consolidate: 5,
            min_file_size_bytes: 4 * 1024, // 4KB
            cleanup_threshold_bytes: 1024, // 1KB
            parallel_downloads: 8,
            staging_root: PathBuf::from("/tmp/parquet_consolidation"),
            row_group_size: 50_000,
            compression: OutputCompression::Snappy,
            caller_identity: None,
            service_identity: Some("hdfs".to_string()),
        }
    }
}

impl ConsolidationConfig {
    /// Checks cross-field invariants.
    pub fn validate(&self) -> Result<()> {
        if self.cleanup_threshold_bytes >= self.min_file_size_bytes {
            return Err(ConsolidationError::Configuration(format!(
                "cleanup_threshold_bytes ({}) must be below min_file_size_bytes ({})",
                self.cleanup_threshold_bytes, self.min_file_size_bytes
            )));
        }
        if self.min_files_to_consolidate == 0 {
            return Err(ConsolidationError::Configuration(
                "min_files_to_consolidate must be at least 1".to_string(),
            ));
        }
        if self.target_file_size_mb == 0 {
            return Err(ConsolidationError::Configuration(
                "target_file_size_mb must be at least 1".to_string(),
            ));
        }
        if self.target_file_size_mb.checked_mul(MEGABYTE).is_none() {
            return Err(ConsolidationError::Configuration(format!(
                "target_file_size_mb ({}) is too large",
                self.target_file_size_mb
            )));
        }
        if self.parallel_downloads == 0 {
            return Err(ConsolidationError::Configuration(
                "parallel_downloads must be at least 1".to_string(),
            ));
        }
        if self.row_group_size == 0 {
            return Err(ConsolidationError::Configuration(
                "row_group_size must be at least 1".to_string(),
            ));
        }
        if self.file_prefix.is_empty() || self.consolidated_marker.is_empty() {
            return Err(ConsolidationError::Configuration(
                "file_prefix and consolidated_marker must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Target output size in bytes.
    pub fn target_file_size_bytes(&self) -> u64 {
        self.target_file_size_mb.saturating_mul(MEGABYTE)
    }

    /// Remote directory of a date partition.
    pub fn partition_path(&self, date: chrono::NaiveDate) -> String {
        format!(
            "{}/date={}",
            self.base_path.trim_end_matches('/'),
            date.format("%Y-%m-%d")
        )
    }

    /// Returns a copy with a different target size.
    pub fn with_target_size_mb(mut self, target_file_size_mb: u64) -> Self {
        self.target_file_size_mb = target_file_size_mb;
        self
    }
}

/// Compression codec for consolidated output.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputCompression {
    #[default]
    Snappy,
    Zstd,
    Uncompressed,
}

impl OutputCompression {
    pub fn to_parquet(self) -> parquet::basic::Compression {
        use parquet::basic::Compression;

        match self {
            OutputCompression::Snappy => Compression::SNAPPY,
            OutputCompression::Zstd => Compression::ZSTD(Default::default()),
            OutputCompression::Uncompressed => Compression::UNCOMPRESSED,
        }
    }
}

/// Remote access strategy, chosen once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemoteConfig {
    /// `hdfs dfs` shell-outs on the local host
    Hdfs {
        namenode_host: Option<String>,
        namenode_port: Option<u16>,
    },
    /// `hdfs dfs` shell-outs on a remote host reached over SSH
    Ssh {
        host: String,
        #[serde(default = "default_remote_scratch")]
        remote_scratch_dir: String,
    },
    /// Native object storage client (S3, GCS, Azure or local filesystem)
    ObjectStore(StorageConfig),
}

fn default_remote_scratch() -> String {
    "/tmp".to_string()
}

impl Default for RemoteConfig {
    fn default() -> Self {
        RemoteConfig::Hdfs {
            namenode_host: Some("big-data-005.kuhn-labs.com".to_string()),
            namenode_port: Some(8020),
        }
    }
}

/// Timeout and retry policy applied to every remote call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteCallPolicy {
    pub list_timeout_secs: u64,
    pub get_timeout_secs: u64,
    pub put_timeout_secs: u64,
    pub delete_timeout_secs: u64,
    /// Retries for transient failures (0 = single attempt)
    pub max_retries: usize,
    pub retry_initial_delay_ms: u64,
}

impl Default for RemoteCallPolicy {
    fn default() -> Self {
        Self {
            list_timeout_secs: 60,
            get_timeout_secs: 120,
            put_timeout_secs: 120,
            delete_timeout_secs: 30,
            max_retries: 0,
            retry_initial_delay_ms: 200,
        }
    }
}

impl RemoteCallPolicy {
    pub fn list_timeout(&self) -> Duration {
        Duration::from_secs(self.list_timeout_secs)
    }

    pub fn get_timeout(&self) -> Duration {
        Duration::from_secs(self.get_timeout_secs)
    }

    pub fn put_timeout(&self) -> Duration {
        Duration::from_secs(self.put_timeout_secs)
    }

    pub fn delete_timeout(&self) -> Duration {
        Duration::from_secs(self.delete_timeout_secs)
    }

    /// Retry configuration derived from this policy.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new(
            self.max_retries,
            Duration::from_millis(self.retry_initial_delay_ms),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_defaults_are_valid() {
        let config = ConsolidationConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.cleanup_threshold_bytes < config.min_file_size_bytes);
        assert_eq!(config.target_file_size_bytes(), 128 * 1024 * 1024);
    }

    #[test]
    fn test_conflated_thresholds_rejected() {
        let config = ConsolidationConfigBuilder::default()
            .cleanup_threshold_bytes(1024u64)
            .min_file_size_bytes(1024u64)
            .build()
            .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConsolidationError::Configuration(_))
        ));
    }

    #[test]
    fn test_zero_values_rejected() {
        let config = ConsolidationConfig {
            parallel_downloads: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ConsolidationConfig::default().with_target_size_mb(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_oversized_target_rejected() {
        let config = ConsolidationConfig::default().with_target_size_mb(1 << 44);
        assert!(matches!(
            config.validate(),
            Err(ConsolidationError::Configuration(msg)) if msg.contains("too large")
        ));
        assert_eq!(config.target_file_size_bytes(), u64::MAX);

        let largest = ConsolidationConfig::default().with_target_size_mb((1 << 44) - 1);
        assert!(largest.validate().is_ok());
    }

    #[test]
    fn test_partition_path() {
        let config = ConsolidationConfigBuilder::default()
            .base_path("/lake/events/")
            .build()
            .unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 8, 15).unwrap();
        assert_eq!(config.partition_path(date), "/lake/events/date=2025-08-15");
    }

    #[test]
    fn test_policy_timeouts() {
        let policy = RemoteCallPolicy::default();
        assert_eq!(policy.list_timeout(), Duration::from_secs(60));
        assert_eq!(policy.delete_timeout(), Duration::from_secs(30));
        assert_eq!(policy.retry_config().max_retries, 0);
    }
}
