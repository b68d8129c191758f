/*
 * Backoff for transient remote failures.
 *
 * Only the remote store layer retries. Consolidation phases see a single
 * outcome per call.
 */

use crate::Result;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

const MAX_DELAY: Duration = Duration::from_secs(30);
const BACKOFF_MULTIPLIER: f64 = 2.0;
const JITTER_FACTOR: f64 = 0.2;

/// Backoff schedule for one remote call.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Extra attempts after the first one
    pub max_retries: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Fraction of the delay added as jitter (0.0-1.0)
    pub jitter_factor: f64,
}

impl RetryConfig {
    pub fn new(max_retries: usize, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay: MAX_DELAY,
            backoff_multiplier: BACKOFF_MULTIPLIER,
            jitter_factor: JITTER_FACTOR,
        }
    }

    /// Delay before retry number `retry` (0-indexed).
    pub fn delay_for_attempt(&self, retry: usize) -> Duration {
        let exp = self.backoff_multiplier.powi(retry as i32);
        let base = (self.initial_delay.as_secs_f64() * exp).min(self.max_delay.as_secs_f64());
        // Golden-ratio spread keeps the jitter deterministic
        let spread = (retry as f64 * 0.618_033_988_749_895).fract();
        Duration::from_secs_f64(base * (1.0 + self.jitter_factor.clamp(0.0, 1.0) * spread))
    }
}

/// Runs a remote operation under a [`RetryConfig`].
pub struct RetryBuilder<'a> {
    config: &'a RetryConfig,
    operation: String,
}

impl<'a> RetryBuilder<'a> {
    pub fn new(config: &'a RetryConfig) -> Self {
        Self {
            config,
            operation: "remote call".to_string(),
        }
    }

    /// Names the operation in log lines.
    pub fn operation(mut self, name: impl Into<String>) -> Self {
        self.operation = name.into();
        self
    }

    /// Calls `attempt` until it succeeds, fails with a non-retryable error, or
    /// the retries run out. The last error is returned.
    pub async fn run<F, Fut, T>(self, attempt: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retry = 0;
        loop {
            let err = match attempt().await {
                Ok(value) => {
                    if retry > 0 {
                        debug!(operation = %self.operation, retries = retry, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            if !err.is_retryable() || retry >= self.config.max_retries {
                if retry > 0 {
                    warn!(operation = %self.operation, retries = retry, "Giving up: {}", err);
                }
                return Err(err);
            }

            let backoff = self.config.delay_for_attempt(retry);
            let delay = err.suggested_retry_delay().map_or(backoff, |d| d.max(backoff));
            warn!(
                operation = %self.operation,
                attempt = retry + 1,
                delay_ms = delay.as_millis() as u64,
                "Transient failure, retrying: {}",
                err
            );
            tokio::time::sleep(delay).await;
            retry += 1;
        }
    }
}
