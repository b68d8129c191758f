/*
 * Object storage operators for the object-store remote strategy.
 *
 * `StorageConfig` is read from the `[remote]` settings section; credentials
 * and service-specific settings go in `options`.
 */

use crate::{ConsolidationError, Result};
use opendal::{Builder, Operator};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Object storage service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    S3,
    Gcs,
    Azure,
    Local,
}

/// Where the partitions live when they are not on HDFS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Bucket, container, or local directory that partition paths are relative to
    pub root: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    /// `access_key_id`, `secret_access_key`, `session_token`, `role_arn` (S3);
    /// `credential` (GCS); `account_name`, `account_key`, `sas_token` (Azure)
    #[serde(default)]
    pub options: HashMap<String, String>,
}

impl StorageConfig {
    /// Local directory standing in for the remote filesystem.
    pub fn local(root: impl Into<String>) -> Self {
        Self {
            backend: StorageBackend::Local,
            root: root.into(),
            endpoint: None,
            region: None,
            options: HashMap::new(),
        }
    }

    fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }
}

/// Builds the opendal operator for `config`.
pub fn build_operator(config: &StorageConfig) -> Result<Operator> {
    match config.backend {
        StorageBackend::S3 => {
            let mut b = opendal::services::S3::default().bucket(&config.root);
            if let Some(endpoint) = &config.endpoint {
                b = b.endpoint(endpoint);
            }
            if let Some(region) = &config.region {
                b = b.region(region);
            }
            if let Some(v) = config.option("access_key_id") {
                b = b.access_key_id(v);
            }
            if let Some(v) = config.option("secret_access_key") {
                b = b.secret_access_key(v);
            }
            if let Some(v) = config.option("session_token") {
                b = b.session_token(v);
            }
            if let Some(v) = config.option("role_arn") {
                b = b.role_arn(v);
            }
            finish(b, "S3")
        }
        StorageBackend::Gcs => {
            let mut b = opendal::services::Gcs::default().bucket(&config.root);
            if let Some(endpoint) = &config.endpoint {
                b = b.endpoint(endpoint);
            }
            if let Some(v) = config.option("credential") {
                b = b.credential(v);
            }
            finish(b, "GCS")
        }
        StorageBackend::Azure => {
            let mut b = opendal::services::Azblob::default().container(&config.root);
            if let Some(endpoint) = &config.endpoint {
                b = b.endpoint(endpoint);
            }
            if let Some(v) = config.option("account_name") {
                b = b.account_name(v);
            }
            if let Some(v) = config.option("account_key") {
                b = b.account_key(v);
            }
            if let Some(v) = config.option("sas_token") {
                b = b.sas_token(v);
            }
            finish(b, "Azure")
        }
        StorageBackend::Local => finish(opendal::services::Fs::default().root(&config.root), "local"),
    }
}

fn finish<B: Builder>(builder: B, service: &str) -> Result<Operator> {
    Operator::new(builder)
        .map(|op| op.finish())
        .map_err(|e| ConsolidationError::Storage(format!("Failed to build {} operator: {}", service, e)))
}
