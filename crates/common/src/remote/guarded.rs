/*
 * Call policy decorator: every remote call gets a timeout budget, and
 * transient failures are retried according to the configured RetryConfig.
 */

use async_trait::async_trait;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::{Identity, RemoteEntry, RemoteStore};
use crate::config::RemoteCallPolicy;
use crate::retry::{RetryBuilder, RetryConfig};
use crate::{ConsolidationError, Result};

/// Wraps a remote store with per-operation timeouts and retries.
pub struct GuardedStore {
    inner: Arc<dyn RemoteStore>,
    policy: RemoteCallPolicy,
    retry: RetryConfig,
}

impl GuardedStore {
    pub fn new(inner: Arc<dyn RemoteStore>, policy: RemoteCallPolicy) -> Self {
        let retry = policy.retry_config();
        Self {
            inner,
            policy,
            retry,
        }
    }

    async fn guarded<T, F, Fut>(&self, operation: String, timeout: Duration, call: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        RetryBuilder::new(&self.retry)
            .operation(operation)
            .run(|| {
                let fut = call();
                async move {
                    match tokio::time::timeout(timeout, fut).await {
                        Ok(result) => result,
                        Err(_) => Err(ConsolidationError::Timeout(timeout)),
                    }
                }
            })
            .await
    }
}

#[async_trait]
impl RemoteStore for GuardedStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn list(&self, dir: &str, identity: &Identity) -> Result<Vec<RemoteEntry>> {
        self.guarded(format!("list {}", dir), self.policy.list_timeout(), || {
            self.inner.list(dir, identity)
        })
        .await
    }

    async fn get(&self, path: &str, local_dest: &Path, identity: &Identity) -> Result<()> {
        self.guarded(format!("get {}", path), self.policy.get_timeout(), || {
            self.inner.get(path, local_dest, identity)
        })
        .await
    }

    async fn put(&self, local_src: &Path, path: &str, identity: &Identity) -> Result<()> {
        self.guarded(format!("put {}", path), self.policy.put_timeout(), || {
            self.inner.put(local_src, path, identity)
        })
        .await
    }

    async fn delete(&self, path: &str, identity: &Identity) -> Result<()> {
        self.guarded(format!("delete {}", path), self.policy.delete_timeout(), || {
            self.inner.delete(path, identity)
        })
        .await
    }
}
