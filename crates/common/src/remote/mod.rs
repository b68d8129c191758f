/*
 * Remote Store capability.
 *
 * The consolidation phases only ever talk to `dyn RemoteStore`. The concrete
 * strategy (hdfs CLI, hdfs over SSH, or a native object storage client) is
 * chosen once by `build_remote_store` and wrapped in a `GuardedStore` that
 * applies per-call timeouts and the retry policy.
 */

mod guarded;
mod hdfs;
mod object_store;

use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::config::{RemoteCallPolicy, RemoteConfig};
use crate::storage::build_operator;
use crate::Result;

pub use guarded::GuardedStore;
pub use hdfs::{parse_ls_output, HdfsCliStore, SshHop};
pub use object_store::OpendalStore;

/// Identity a remote call is performed under.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    user: Option<String>,
}

impl Identity {
    /// The ambient identity of the running process.
    pub fn caller() -> Self {
        Self { user: None }
    }

    /// A named service identity, used for cross-owner writes.
    pub fn service(user: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
        }
    }

    /// Named identity if given, otherwise the caller.
    pub fn from_user(user: Option<&str>) -> Self {
        match user {
            Some(u) if !u.is_empty() => Self::service(u),
            _ => Self::caller(),
        }
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.user {
            Some(user) => write!(f, "{}", user),
            None => write!(f, "<caller>"),
        }
    }
}

/// A file as reported by a remote listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub path: String,
    pub size_bytes: u64,
}

/// Path-addressed remote filesystem access.
///
/// `list` returns sizes with the listing so callers never stat per file.
/// `delete` of a missing path succeeds.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Short name of the strategy, for logs.
    fn name(&self) -> &str;

    /// Lists the files (not directories) directly under `dir`.
    async fn list(&self, dir: &str, identity: &Identity) -> Result<Vec<RemoteEntry>>;

    /// Downloads `path` to `local_dest`.
    async fn get(&self, path: &str, local_dest: &Path, identity: &Identity) -> Result<()>;

    /// Uploads `local_src` to `path`. Fails if `path` already exists.
    async fn put(&self, local_src: &Path, path: &str, identity: &Identity) -> Result<()>;

    /// Deletes `path` if present.
    async fn delete(&self, path: &str, identity: &Identity) -> Result<()>;
}

/// Builds the configured remote store strategy, wrapped in the call policy.
pub fn build_remote_store(
    config: &RemoteConfig,
    policy: &RemoteCallPolicy,
) -> Result<Arc<dyn RemoteStore>> {
    let inner: Arc<dyn RemoteStore> = match config {
        RemoteConfig::Hdfs {
            namenode_host,
            namenode_port,
        } => {
            let fs_uri = namenode_host.as_ref().map(|host| match namenode_port {
                Some(port) => format!("hdfs://{}:{}", host, port),
                None => format!("hdfs://{}", host),
            });
            Arc::new(HdfsCliStore::local(fs_uri))
        }
        RemoteConfig::Ssh {
            host,
            remote_scratch_dir,
        } => Arc::new(HdfsCliStore::over_ssh(SshHop {
            host: host.clone(),
            scratch_dir: remote_scratch_dir.clone(),
        })),
        RemoteConfig::ObjectStore(storage) => {
            Arc::new(OpendalStore::new(build_operator(storage)?))
        }
    };

    tracing::info!(store = inner.name(), "Remote store selected");

    Ok(Arc::new(GuardedStore::new(inner, policy.clone())))
}
