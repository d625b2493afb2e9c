//! # Cache Store
//!
//! Reads and writes the versioned [`CacheSnapshot`] document under its
//! fixed key. A stored document with the wrong version or invalid JSON
//! is discarded wholesale and replaced by the default snapshot — the
//! engine never partially trusts a malformed cache.

use std::sync::Arc;

use tracing::{debug, warn};

use fila_core::{CacheSnapshot, QueueError, QueueResult};

use crate::keys::CACHE_KEY;
use crate::kv::KvStore;

/// Versioned snapshot reader/writer over the key-value seam.
///
/// The synchronization engine is the only writer of this document.
pub struct CacheStore {
    storage: Arc<dyn KvStore>,
}

impl CacheStore {
    pub fn new(storage: Arc<dyn KvStore>) -> Self {
        CacheStore { storage }
    }

    /// Loads the snapshot, falling back to defaults for an absent,
    /// invalid, or version-mismatched document.
    pub async fn load(&self) -> QueueResult<CacheSnapshot> {
        let raw = self.storage.get(CACHE_KEY).await?;

        let snapshot = match raw {
            None => {
                debug!("No cached snapshot, starting from defaults");
                CacheSnapshot::default()
            }
            Some(raw) => match CacheSnapshot::decode(&raw) {
                Some(snapshot) => snapshot,
                None => {
                    warn!("Discarding invalid or version-mismatched cached snapshot");
                    CacheSnapshot::default()
                }
            },
        };

        Ok(snapshot)
    }

    /// Persists the snapshot, replacing the previous document.
    pub async fn save(&self, snapshot: &CacheSnapshot) -> QueueResult<()> {
        let raw = snapshot
            .encode()
            .map_err(|e| QueueError::Serialization(e.to_string()))?;
        self.storage.set(CACHE_KEY, &raw).await?;
        debug!(
            orders = snapshot.orders.len(),
            details = snapshot.details.len(),
            "Persisted cache snapshot"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;
    use fila_core::SNAPSHOT_VERSION;

    #[tokio::test]
    async fn test_load_absent_yields_default() {
        let store = CacheStore::new(Arc::new(MemoryStore::new()));
        let snapshot = store.load().await.unwrap();
        assert_eq!(snapshot, CacheSnapshot::default());
    }

    #[tokio::test]
    async fn test_load_invalid_json_yields_default() {
        let storage = Arc::new(MemoryStore::new());
        storage.seed(CACHE_KEY, "{{{ not json").await;

        let store = CacheStore::new(storage);
        assert_eq!(store.load().await.unwrap(), CacheSnapshot::default());
    }

    #[tokio::test]
    async fn test_load_version_mismatch_yields_default() {
        let storage = Arc::new(MemoryStore::new());
        let mut snapshot = CacheSnapshot::default();
        snapshot.version = SNAPSHOT_VERSION + 1;
        snapshot.wallet.balance_cents = 10_000;
        storage.seed(CACHE_KEY, &snapshot.encode().unwrap()).await;

        let store = CacheStore::new(storage);
        // The balance from the mismatched document must NOT leak through.
        assert_eq!(store.load().await.unwrap(), CacheSnapshot::default());
    }

    #[tokio::test]
    async fn test_save_then_load_roundtrip() {
        let storage = Arc::new(MemoryStore::new());
        let store = CacheStore::new(storage);

        let mut snapshot = CacheSnapshot::default();
        snapshot.wallet.plan_active = true;
        snapshot.wallet.balance_cents = 2_500;

        store.save(&snapshot).await.unwrap();
        assert_eq!(store.load().await.unwrap(), snapshot);
    }
}
