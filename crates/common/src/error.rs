/*
 * Error types for partition consolidation.
 *
 * Errors are categorized by:
 * - Phase: where the error originated (listing, transfer, merge, reap, etc.)
 * - Retryability: whether the remote call can be retried by the store layer
 * - Scope: whether the error aborts the current date or is only recorded
 */

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConsolidationError {
    #[error("Remote listing failed for {path}: {reason}")]
    RemoteList { path: String, reason: String },

    #[error("Remote I/O failed: {0}")]
    RemoteIo(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Row count mismatch: expected {expected} rows, output has {actual}")]
    RowCountMismatch { expected: u64, actual: u64 },

    #[error("Partial reap: {failed} of {attempted} source files could not be removed")]
    PartialReap { failed: usize, attempted: usize },

    #[error("Timeout: operation exceeded {0:?}")]
    Timeout(Duration),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Staging error: {0}")]
    Staging(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
}

impl ConsolidationError {
    /// Returns true if this error is likely transient and the remote call can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ConsolidationError::RemoteList { .. }
                | ConsolidationError::RemoteIo(_)
                | ConsolidationError::Storage(_)
                | ConsolidationError::Timeout(_)
        )
    }

    /// Returns true if this error aborts processing of the current date.
    ///
    /// Listing failures degrade to an empty partition and reap failures are
    /// warnings; everything else stops the date.
    pub fn is_fatal_for_date(&self) -> bool {
        !matches!(
            self,
            ConsolidationError::RemoteList { .. } | ConsolidationError::PartialReap { .. }
        )
    }

    /// Returns a suggested retry delay for this error type.
    pub fn suggested_retry_delay(&self) -> Option<Duration> {
        match self {
            ConsolidationError::RemoteList { .. } => Some(Duration::from_millis(200)),
            ConsolidationError::RemoteIo(_) => Some(Duration::from_millis(200)),
            ConsolidationError::Storage(_) => Some(Duration::from_millis(200)),
            ConsolidationError::Timeout(_) => Some(Duration::from_secs(1)),
            _ => None,
        }
    }

    /// Wraps this error with additional context.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        let ctx = context.into();
        match self {
            ConsolidationError::RemoteList { path, reason } => ConsolidationError::RemoteList {
                path,
                reason: format!("{}: {}", ctx, reason),
            },
            ConsolidationError::RemoteIo(msg) => {
                ConsolidationError::RemoteIo(format!("{}: {}", ctx, msg))
            }
            ConsolidationError::SchemaMismatch(msg) => {
                ConsolidationError::SchemaMismatch(format!("{}: {}", ctx, msg))
            }
            ConsolidationError::Configuration(msg) => {
                ConsolidationError::Configuration(format!("{}: {}", ctx, msg))
            }
            ConsolidationError::Staging(msg) => {
                ConsolidationError::Staging(format!("{}: {}", ctx, msg))
            }
            ConsolidationError::Execution(msg) => {
                ConsolidationError::Execution(format!("{}: {}", ctx, msg))
            }
            ConsolidationError::Storage(msg) => {
                ConsolidationError::Storage(format!("{}: {}", ctx, msg))
            }
            ConsolidationError::Cancelled(msg) => {
                ConsolidationError::Cancelled(format!("{}: {}", ctx, msg))
            }
            // Structured variants keep their shape
            e @ (ConsolidationError::RowCountMismatch { .. }
            | ConsolidationError::PartialReap { .. }
            | ConsolidationError::Timeout(_)) => e,
            e @ (ConsolidationError::Io(_)
            | ConsolidationError::Arrow(_)
            | ConsolidationError::Parquet(_)) => {
                ConsolidationError::Execution(format!("{}: {}", ctx, e))
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, ConsolidationError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Adds context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Adds context lazily (only evaluated on error).
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
