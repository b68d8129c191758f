/*
 * Remote store backed by an opendal Operator (S3, GCS, Azure, local fs).
 */

use async_trait::async_trait;
use opendal::{Capability, EntryMode, ErrorKind, Operator};
use std::path::Path;

use super::{Identity, RemoteEntry, RemoteStore};
use crate::{ConsolidationError, Result};

/// Where file sizes come from during a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SizeSource {
    /// The listing carries sizes, zero included
    Listing,
    /// One stat per file
    Stat,
}

impl SizeSource {
    fn for_capability(cap: &Capability) -> Self {
        if cap.list_has_content_length {
            SizeSource::Listing
        } else {
            SizeSource::Stat
        }
    }
}

/// Object storage client. Credentials are bound when the operator is built,
/// so the per-call identity is only recorded in logs.
#[derive(Debug, Clone)]
pub struct OpendalStore {
    op: Operator,
    sizes: SizeSource,
}

impl OpendalStore {
    pub fn new(op: Operator) -> Self {
        let sizes = SizeSource::for_capability(&op.info().full_capability());
        Self { op, sizes }
    }

    fn storage_err(action: &str, path: &str, e: opendal::Error) -> ConsolidationError {
        ConsolidationError::RemoteIo(format!("{} {} failed: {}", action, path, e))
    }
}

#[async_trait]
impl RemoteStore for OpendalStore {
    fn name(&self) -> &str {
        "opendal"
    }

    async fn list(&self, dir: &str, _identity: &Identity) -> Result<Vec<RemoteEntry>> {
        let list_dir = format!("{}/", dir.trim_end_matches('/'));
        let absolute = dir.starts_with('/');

        let entries = self
            .op
            .list(&list_dir)
            .await
            .map_err(|e| ConsolidationError::RemoteList {
                path: dir.to_string(),
                reason: e.to_string(),
            })?;

        let mut files = Vec::with_capacity(entries.len());
        for entry in entries {
            if entry.metadata().mode() != EntryMode::FILE {
                continue;
            }

            let size_bytes = match self.sizes {
                SizeSource::Listing => entry.metadata().content_length(),
                SizeSource::Stat => match self.op.stat(entry.path()).await {
                    Ok(meta) => meta.content_length(),
                    Err(e) => {
                        // Left for the next run; an unlisted file is never merged or deleted
                        tracing::warn!(path = entry.path(), "Skipping file, stat failed: {}", e);
                        continue;
                    }
                },
            };

            let relative = entry.path().trim_start_matches('/');
            let path = if absolute {
                format!("/{}", relative)
            } else {
                relative.to_string()
            };
            files.push(RemoteEntry { path, size_bytes });
        }

        Ok(files)
    }

    async fn get(&self, path: &str, local_dest: &Path, identity: &Identity) -> Result<()> {
        let data = self
            .op
            .read(path)
            .await
            .map_err(|e| Self::storage_err("read", path, e))?
            .to_bytes();

        tokio::fs::write(local_dest, &data).await?;

        tracing::debug!(path, bytes = data.len(), identity = %identity, "Downloaded");
        Ok(())
    }

    async fn put(&self, local_src: &Path, path: &str, identity: &Identity) -> Result<()> {
        match self.op.stat(path).await {
            Ok(_) => {
                return Err(ConsolidationError::RemoteIo(format!(
                    "refusing to overwrite existing object {}",
                    path
                )))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(Self::storage_err("stat", path, e)),
        }

        let data = tokio::fs::read(local_src).await?;
        let len = data.len();
        self.op
            .write(path, data)
            .await
            .map_err(|e| Self::storage_err("write", path, e))?;

        tracing::debug!(path, bytes = len, identity = %identity, "Uploaded");
        Ok(())
    }

    async fn delete(&self, path: &str, _identity: &Identity) -> Result<()> {
        self.op
            .delete(path)
            .await
            .map_err(|e| Self::storage_err("delete", path, e))
    }
}
