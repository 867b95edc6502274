//! File-backed [`StorageAdapter`] for the CLI binary. The core crates only
//! define the `save`/`load` contract (kontext-store::backend) and ship an
//! in-memory test double; a real on-disk backend is, per spec.md §1's
//! Non-goals, an external collaborator the CLI supplies for itself.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use kontext_store::StorageAdapter;
use kontext_store::StoreError;
use tokio::sync::RwLock;

/// Persists every key as one JSON object in a single file, read in full on
/// first access and rewritten in full on every save. Fine for the CLI's
/// one-shot-invocation usage pattern; not intended for concurrent writers.
pub struct FileAdapter {
    path: PathBuf,
    cache: RwLock<Option<HashMap<String, serde_json::Value>>>,
}

impl FileAdapter {
    pub fn new(path: PathBuf) -> Self {
        Self { path, cache: RwLock::new(None) }
    }

    async fn load_cache(&self) -> Result<HashMap<String, serde_json::Value>, StoreError> {
        if let Some(existing) = self.cache.read().await.as_ref() {
            return Ok(existing.clone());
        }
        let map = if self.path.exists() {
            let bytes = std::fs::read(&self.path).map_err(|e| StoreError::StorageIo {
                operation: "read".into(),
                reason: e.to_string(),
            })?;
            serde_json::from_slice(&bytes).map_err(|e| StoreError::StorageIo {
                operation: "deserialize".into(),
                reason: e.to_string(),
            })?
        } else {
            HashMap::new()
        };
        *self.cache.write().await = Some(map.clone());
        Ok(map)
    }
}

#[async_trait]
impl StorageAdapter for FileAdapter {
    async fn save(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError> {
        let mut map = self.load_cache().await?;
        map.insert(key.to_string(), value);
        let bytes = serde_json::to_vec_pretty(&map).map_err(|e| StoreError::StorageIo {
            operation: "serialize".into(),
            reason: e.to_string(),
        })?;
        std::fs::write(&self.path, bytes).map_err(|e| StoreError::StorageIo {
            operation: "write".into(),
            reason: e.to_string(),
        })?;
        *self.cache.write().await = Some(map);
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let map = self.load_cache().await?;
        Ok(map.get(key).cloned())
    }
}
