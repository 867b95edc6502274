//! Storage Adapter contract (C11, external interface §6) — a plain
//! key→JSON-blob save/load boundary. The core never knows or cares what's
//! behind it (sqlite, S3, a test double); it only needs `save`/`load` to
//! round-trip whatever `serde_json::Value` the Store snapshot produced.
//!
//! Grounded on `vex-persist::backend::StorageBackend` / `MemoryBackend`,
//! trimmed to the two operations spec.md §6 actually names (no `delete`,
//! `exists`, or `list_keys` — those are donor conveniences for its own
//! multi-tenant key scheme, not part of this contract).

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreError;

/// Well-known keys the Store flushes to and restores from (spec.md §6).
pub const KEY_EVENTS: &str = "kontext:events";
pub const KEY_TRANSACTIONS: &str = "kontext:transactions";
pub const KEY_TASKS: &str = "kontext:tasks";
pub const KEY_ANOMALIES: &str = "kontext:anomalies";
pub const KEY_SESSIONS: &str = "kontext:sessions";
pub const KEY_CHECKPOINTS: &str = "kontext:checkpoints";

/// Key→value blob save/load contract (C11). Implementations MUST be
/// concurrent-safe for the Store's own serialization discipline (only one
/// flush in flight at a time, see §5) but need not support concurrent writes
/// to the same key from outside that discipline.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    async fn save(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError>;
    async fn load(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError>;
}

/// Typed convenience layer over [`StorageAdapter`], mirroring
/// `vex-persist::backend::StorageExt`.
#[async_trait]
pub trait StorageAdapterExt: StorageAdapter {
    async fn save_typed<T: serde::Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_value(value).map_err(|e| StoreError::StorageIo {
            operation: format!("serialize {key}"),
            reason: e.to_string(),
        })?;
        self.save(key, json).await
    }

    async fn load_typed<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        match self.load(key).await? {
            Some(json) => {
                let value = serde_json::from_value(json).map_err(|e| StoreError::StorageIo {
                    operation: format!("deserialize {key}"),
                    reason: e.to_string(),
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }
}

impl<A: StorageAdapter + ?Sized> StorageAdapterExt for A {}

/// An in-memory [`StorageAdapter`], used by tests and by callers who accept
/// that `flush`/`restore` are no-ops across process restarts.
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    data: RwLock<HashMap<String, serde_json::Value>>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageAdapter for MemoryAdapter {
    async fn save(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError> {
        self.data.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(self.data.read().await.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_adapter_round_trips_typed_values() {
        let adapter = MemoryAdapter::new();
        adapter.save_typed(KEY_EVENTS, &vec![1, 2, 3]).await.unwrap();
        let loaded: Option<Vec<i32>> = adapter.load_typed(KEY_EVENTS).await.unwrap();
        assert_eq!(loaded, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn memory_adapter_absent_key_loads_none() {
        let adapter = MemoryAdapter::new();
        let loaded: Option<Vec<i32>> = adapter.load_typed(KEY_TRANSACTIONS).await.unwrap();
        assert_eq!(loaded, None);
    }
}
