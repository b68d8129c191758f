//! In-memory remote store for planner tests.

use async_trait::async_trait;
use consolidation_common::{ConsolidationError, Identity, RemoteEntry, RemoteStore, Result};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    List(String),
    Delete(String),
}

#[derive(Default)]
pub struct MemoryStore {
    files: Mutex<BTreeMap<String, u64>>,
    calls: Mutex<Vec<RemoteCall>>,
    identities: Mutex<Vec<Identity>>,
    failing_deletes: Mutex<HashSet<String>>,
    fail_list: Mutex<bool>,
}

impl MemoryStore {
    pub fn with_files(files: &[(&str, u64)]) -> Self {
        let store = Self::default();
        {
            let mut map = store.files.lock().unwrap();
            for (path, size) in files {
                map.insert(path.to_string(), *size);
            }
        }
        store
    }

    pub fn fail_list(&self) {
        *self.fail_list.lock().unwrap() = true;
    }

    pub fn fail_delete(&self, path: &str) {
        self.failing_deletes.lock().unwrap().insert(path.to_string());
    }

    pub fn exists(&self, path: &str) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn list_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, RemoteCall::List(_)))
            .count()
    }

    pub fn identities(&self) -> Vec<Identity> {
        self.identities.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list(&self, dir: &str, _identity: &Identity) -> Result<Vec<RemoteEntry>> {
        self.calls.lock().unwrap().push(RemoteCall::List(dir.to_string()));
        if *self.fail_list.lock().unwrap() {
            return Err(ConsolidationError::RemoteList {
                path: dir.to_string(),
                reason: "namenode unreachable".to_string(),
            });
        }
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        Ok(self
            .files
            .lock()
            .unwrap()
            .iter()
            .filter(|(path, _)| {
                path.strip_prefix(&prefix)
                    .map(|rest| !rest.contains('/'))
                    .unwrap_or(false)
            })
            .map(|(path, size)| RemoteEntry {
                path: path.clone(),
                size_bytes: *size,
            })
            .collect())
    }

    async fn get(&self, path: &str, _local_dest: &Path, _identity: &Identity) -> Result<()> {
        Err(ConsolidationError::RemoteIo(format!("get not supported: {}", path)))
    }

    async fn put(&self, _local_src: &Path, path: &str, _identity: &Identity) -> Result<()> {
        Err(ConsolidationError::RemoteIo(format!("put not supported: {}", path)))
    }

    async fn delete(&self, path: &str, identity: &Identity) -> Result<()> {
        self.calls.lock().unwrap().push(RemoteCall::Delete(path.to_string()));
        self.identities.lock().unwrap().push(identity.clone());
        if self.failing_deletes.lock().unwrap().contains(path) {
            return Err(ConsolidationError::RemoteIo(format!("permission denied: {}", path)));
        }
        self.files.lock().unwrap().remove(path);
        Ok(())
    }
}
