//! Storage trait for the issuer key registry.
//!
//! The registry is small and changes rarely, so the contract is whole-set:
//! [`IssuerKeyStore::load_keys`] returns every key, and
//! [`IssuerKeyStore::save_keys`] replaces every key. There are no partial
//! updates and no versioning.
//!
//! # Usage
//!
//! ```no_run
//! // Demonstrates the trait interface; requires a concrete store implementation.
//! use xdb_common_storage::{IssuerKey, IssuerKeyStore, StorageResult};
//!
//! async fn replace<S: IssuerKeyStore>(store: &S, key: IssuerKey) -> StorageResult<()> {
//!     let mut keys = store.load_keys().await?;
//!     keys.retain(|k| k.issuer != key.issuer);
//!     keys.push(key);
//!     store.save_keys(&keys).await
//! }
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{error::StorageResult, issuer_key::IssuerKey};

/// Persistence layer for the trusted issuer key registry.
///
/// Abstracts key storage so production (a JSON file in the catalog root)
/// and testing (in-memory) share the same interface.
#[async_trait]
pub trait IssuerKeyStore: Send + Sync {
    /// Loads every persisted issuer key.
    ///
    /// An empty or never-written store yields an empty vector.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage is unreadable or its
    /// contents cannot be decoded.
    async fn load_keys(&self) -> StorageResult<Vec<IssuerKey>>;

    /// Replaces the persisted registry with `keys`.
    ///
    /// # Errors
    ///
    /// Returns an error if the keys cannot be encoded or written. On error
    /// the previously persisted registry must remain intact.
    async fn save_keys(&self, keys: &[IssuerKey]) -> StorageResult<()>;
}

#[async_trait]
impl<S: IssuerKeyStore + ?Sized> IssuerKeyStore for Arc<S> {
    async fn load_keys(&self) -> StorageResult<Vec<IssuerKey>> {
        (**self).load_keys().await
    }

    async fn save_keys(&self, keys: &[IssuerKey]) -> StorageResult<()> {
        (**self).save_keys(keys).await
    }
}

/// In-memory implementation of [`IssuerKeyStore`] for testing.
///
/// Clones share the same underlying registry, which makes it easy to
/// simulate a process restart: build a second consumer on a clone and
/// reload.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use xdb_common_storage::{IssuerKey, IssuerKeyStore, MemoryIssuerKeyStore};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let store = MemoryIssuerKeyStore::new();
/// assert!(store.load_keys().await.unwrap().is_empty());
///
/// let key = IssuerKey::builder().issuer("a").public_key("k").expiry(Utc::now()).build();
/// store.save_keys(&[key]).await.unwrap();
/// assert_eq!(store.save_count(), 1);
/// # });
/// ```
#[derive(Debug, Default, Clone)]
pub struct MemoryIssuerKeyStore {
    keys: Arc<RwLock<Vec<IssuerKey>>>,
    saves: Arc<AtomicU64>,
}

impl MemoryIssuerKeyStore {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-seeded with `keys`.
    #[must_use]
    pub fn with_keys(keys: Vec<IssuerKey>) -> Self {
        Self { keys: Arc::new(RwLock::new(keys)), saves: Arc::default() }
    }

    /// Number of successful [`save_keys`](IssuerKeyStore::save_keys) calls.
    #[must_use]
    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::Acquire)
    }
}

#[async_trait]
impl IssuerKeyStore for MemoryIssuerKeyStore {
    #[tracing::instrument(skip(self))]
    async fn load_keys(&self) -> StorageResult<Vec<IssuerKey>> {
        Ok(self.keys.read().clone())
    }

    #[tracing::instrument(skip(self, keys), fields(count = keys.len()))]
    async fn save_keys(&self, keys: &[IssuerKey]) -> StorageResult<()> {
        *self.keys.write() = keys.to_vec();
        self.saves.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}
