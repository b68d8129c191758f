/*
 * Partition Consolidation - Common Types
 *
 * Shared data model, configuration, errors, metrics, and remote store access
 * used by the planner, worker, and orchestrator crates.
 */

pub mod config;
pub mod error;
pub mod metrics;
pub mod partition;
pub mod remote;
pub mod retry;
pub mod storage;

pub use config::*;
pub use error::{ConsolidationError, Result, ResultExt};
pub use metrics::{ConsolidationMetrics, MetricsSnapshot, Timer};
pub use partition::{FileEntry, PartitionSnapshot, BYTES_PER_MB};
pub use remote::{build_remote_store, Identity, RemoteEntry, RemoteStore};
pub use retry::{RetryBuilder, RetryConfig};
pub use storage::{build_operator, StorageBackend, StorageConfig};
