/*
 * Parquet Consolidation - Worker
 *
 * The worker is responsible for:
 * 1. Downloading eligible files into local staging with bounded concurrency
 * 2. Merging staged files into one verified Parquet output
 * 3. Publishing the output under a generation-stamped name
 * 4. Removing the merged source files after a confirmed publish
 *
 * IMPORTANT: For production, use jemalloc in your main binary:
 * ```ignore
 * #[global_allocator]
 * static GLOBAL: consolidation_worker::Jemalloc = consolidation_worker::Jemalloc;
 * ```
 * This prevents memory fragmentation with large Parquet row groups.
 */

// Re-export jemalloc for easy use in binaries
pub use tikv_jemallocator::Jemalloc;

pub mod fetcher;
pub mod merger;
pub mod publisher;
pub mod reaper;

pub use fetcher::{DownloadResult, FetchReport, ParallelFetcher};
pub use merger::{verify_output_rows, MergeResult, Merger, MergerConfig, StagedFile};
pub use publisher::{PublishReceipt, Publisher};
pub use reaper::{ReapFailure, ReapReport, SourceReaper};
