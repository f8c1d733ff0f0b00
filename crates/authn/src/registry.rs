//! Trusted issuer key registry.
//!
//! [`IssuerRegistry`] keeps the issuer → key mapping in memory and persists
//! it through an [`IssuerKeyStore`].
//!
//! # Consistency
//!
//! Reads happen on every token verification and clone an immutable
//! `Arc<HashMap>` snapshot, so a reader never observes a half-applied update.
//! Writers build a new map, swap it in, then persist the full set. Writers
//! are serialized by an async mutex so two concurrent updates cannot persist
//! out of order.
//!
//! A persistence failure is returned to the caller, but the in-memory update
//! stays in place and the next successful save writes it.

use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;
use tokio::sync::Mutex;
use xdb_common_storage::{IssuerKey, IssuerKeyStore};

use crate::{
    error::{AuthError, Result},
    key::IssuerPublicKey,
};

/// Immutable view of the registry at one point in time.
pub type RegistrySnapshot = Arc<HashMap<String, IssuerKey>>;

/// In-memory issuer registry backed by an [`IssuerKeyStore`].
pub struct IssuerRegistry {
    store: Arc<dyn IssuerKeyStore>,
    snapshot: RwLock<RegistrySnapshot>,
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for IssuerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuerRegistry").field("issuers", &self.issuers()).finish_non_exhaustive()
    }
}

impl IssuerRegistry {
    /// Loads the registry from `store`.
    ///
    /// Entries with unparseable key material are kept (tokens from those
    /// issuers fail verification) and logged. When an issuer appears twice,
    /// the later entry wins.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::KeyStorageError`] if the store cannot be read.
    #[tracing::instrument(skip(store))]
    pub async fn load(store: Arc<dyn IssuerKeyStore>) -> Result<Self> {
        let keys = store.load_keys().await.map_err(AuthError::key_storage_error)?;

        let mut map = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Err(e) = IssuerPublicKey::parse(&key.public_key) {
                tracing::warn!(issuer = %key.issuer, error = %e, "registered issuer key is unusable");
            }
            map.insert(key.issuer.clone(), key);
        }

        tracing::info!(count = map.len(), "issuer registry loaded");
        Ok(Self { store, snapshot: RwLock::new(Arc::new(map)), write_lock: Mutex::new(()) })
    }

    /// Current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> RegistrySnapshot {
        Arc::clone(&self.snapshot.read())
    }

    /// Looks up one issuer.
    #[must_use]
    pub fn get(&self, issuer: &str) -> Option<IssuerKey> {
        self.snapshot.read().get(issuer).cloned()
    }

    /// Registered issuer identifiers, sorted.
    #[must_use]
    pub fn issuers(&self) -> Vec<String> {
        let mut issuers: Vec<String> = self.snapshot.read().keys().cloned().collect();
        issuers.sort();
        issuers
    }

    /// Inserts or replaces an issuer key and persists the full registry.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidPublicKey`] (registry untouched) if the key
    /// material cannot be parsed, and [`AuthError::KeyStorageError`] if
    /// persisting fails. In the latter case the in-memory registry already
    /// holds the new key.
    #[tracing::instrument(skip(self, key), fields(issuer = %key.issuer))]
    pub async fn update(&self, key: IssuerKey) -> Result<()> {
        IssuerPublicKey::parse(&key.public_key)?;

        let _guard = self.write_lock.lock().await;

        let next = {
            let mut snapshot = self.snapshot.write();
            let mut map = HashMap::clone(&snapshot);
            map.insert(key.issuer.clone(), key);
            let next = Arc::new(map);
            *snapshot = Arc::clone(&next);
            next
        };

        let mut keys: Vec<IssuerKey> = next.values().cloned().collect();
        keys.sort_by(|a, b| a.issuer.cmp(&b.issuer));

        if let Err(e) = self.store.save_keys(&keys).await {
            tracing::warn!(error = %e, "issuer key updated in memory but not persisted");
            return Err(AuthError::key_storage_error(e));
        }

        tracing::info!(count = keys.len(), "issuer registry persisted");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use async_trait::async_trait;
    use chrono::Duration;
    use xdb_common_storage::{MemoryIssuerKeyStore, StorageError, StorageResult};

    use super::*;
    use crate::{assert_auth_error, testutil::TestIssuer};

    /// Store that loads fine but refuses every write.
    struct ReadOnlyStore(MemoryIssuerKeyStore);

    #[async_trait]
    impl IssuerKeyStore for ReadOnlyStore {
        async fn load_keys(&self) -> StorageResult<Vec<IssuerKey>> {
            self.0.load_keys().await
        }

        async fn save_keys(&self, _keys: &[IssuerKey]) -> StorageResult<()> {
            Err(StorageError::internal("read-only"))
        }
    }

    #[tokio::test]
    async fn test_load_empty() {
        let registry =
            IssuerRegistry::load(Arc::new(MemoryIssuerKeyStore::new())).await.expect("load");
        assert!(registry.issuers().is_empty());
        assert!(registry.get("blackbook").is_none());
    }

    #[tokio::test]
    async fn test_update_persists_full_registry() {
        let a = TestIssuer::new("a");
        let b = TestIssuer::new("b");
        let store = MemoryIssuerKeyStore::with_keys(vec![a.key(Duration::days(1))]);
        let registry = IssuerRegistry::load(Arc::new(store.clone())).await.expect("load");

        registry.update(b.key(Duration::days(1))).await.expect("update");

        assert_eq!(registry.issuers(), vec!["a".to_owned(), "b".to_owned()]);
        let persisted = store.load_keys().await.expect("load");
        assert_eq!(persisted.len(), 2);
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn test_update_replaces_existing_key() {
        let first = TestIssuer::new("blackbook");
        let rotated = TestIssuer::new("blackbook");
        let registry = IssuerRegistry::load(Arc::new(MemoryIssuerKeyStore::with_keys(vec![
            first.key(Duration::days(1)),
        ])))
        .await
        .expect("load");

        registry.update(rotated.key(Duration::days(2))).await.expect("update");

        let current = registry.get("blackbook").expect("registered");
        assert_eq!(current.public_key, rotated.public_key());
    }

    #[tokio::test]
    async fn test_update_rejects_invalid_key_material() {
        let store = MemoryIssuerKeyStore::new();
        let registry = IssuerRegistry::load(Arc::new(store.clone())).await.expect("load");
        let mut key = TestIssuer::new("blackbook").key(Duration::days(1));
        key.public_key = "definitely-not-a-key".into();

        assert_auth_error!(registry.update(key).await, InvalidPublicKey);
        assert!(registry.get("blackbook").is_none());
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_persistence_failure_keeps_memory_update() {
        let registry = IssuerRegistry::load(Arc::new(ReadOnlyStore(MemoryIssuerKeyStore::new())))
            .await
            .expect("load");

        let result = registry.update(TestIssuer::new("blackbook").key(Duration::days(1))).await;

        assert_auth_error!(result, KeyStorageError);
        assert!(registry.get("blackbook").is_some(), "in-memory update must not be lost");
    }

    #[tokio::test]
    async fn test_snapshot_is_immutable() {
        let registry =
            IssuerRegistry::load(Arc::new(MemoryIssuerKeyStore::new())).await.expect("load");
        let before = registry.snapshot();

        registry.update(TestIssuer::new("a").key(Duration::days(1))).await.expect("update");

        assert!(before.is_empty(), "old snapshot must not observe the update");
        assert_eq!(registry.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_load_keeps_unusable_entries() {
        let mut key = TestIssuer::new("broken").key(Duration::days(1));
        key.public_key = "???".into();
        let registry =
            IssuerRegistry::load(Arc::new(MemoryIssuerKeyStore::with_keys(vec![key])))
                .await
                .expect("load");

        assert!(registry.get("broken").is_some());
    }
}
