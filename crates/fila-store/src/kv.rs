//! # Key-Value Storage Seam
//!
//! The queue subsystem persists everything through an async string
//! key-value primitive supplied by the embedding app (device storage,
//! secure storage, whatever the platform offers). This module defines
//! that seam and an in-memory implementation used by tests and by
//! simulator-only setups.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use fila_core::QueueResult;

// =============================================================================
// KvStore Trait
// =============================================================================

/// Async get/set/remove keyed by string.
///
/// Implementations must be safe to call concurrently; individual
/// operations are atomic but no cross-key transactionality is assumed
/// anywhere in the subsystem.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Reads the value stored under `key`, if any.
    async fn get(&self, key: &str) -> QueueResult<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> QueueResult<()>;

    /// Removes `key`. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> QueueResult<()>;
}

// =============================================================================
// In-Memory Store
// =============================================================================

/// `KvStore` backed by a `HashMap`. Used in tests and wherever no
/// durable storage is wired in.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populates a key. Convenience for test setup.
    pub async fn seed(&self, key: &str, value: &str) {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> QueueResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> QueueResult<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> QueueResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);

        store.set("k", "v1").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v1".to_string()));

        store.set("k", "v2").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v2".to_string()));

        store.remove("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_remove_absent_key_is_ok() {
        let store = MemoryStore::new();
        assert!(store.remove("missing").await.is_ok());
    }
}
