//! Issuer key persistence for the xdb authorization core.
//!
//! Token issuers are trusted through their public keys. This crate owns the
//! [`IssuerKey`] record and the [`IssuerKeyStore`] trait that loads and saves
//! the full set of keys, so the authentication layer can stay agnostic of
//! where the registry lives.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │        xdb-common-authn (IssuerRegistry)      │
//! │  in-memory snapshot, read on every request   │
//! ├──────────────────────────────────────────────┤
//! │        xdb-common-storage (this crate)        │
//! │   IssuerKeyStore: load_keys / save_keys      │
//! ├──────────────────────┬───────────────────────┤
//! │ MemoryIssuerKeyStore │  FileIssuerKeyStore   │
//! │      (testing)       │ (<root>/PUBKEYS.json) │
//! └──────────────────────┴───────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use chrono::{Duration, Utc};
//! use xdb_common_storage::{IssuerKey, IssuerKeyStore, MemoryIssuerKeyStore};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let store = MemoryIssuerKeyStore::new();
//! let key = IssuerKey::builder()
//!     .issuer("blackbook")
//!     .public_key("11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo")
//!     .expiry(Utc::now() + Duration::days(30))
//!     .build();
//!
//! store.save_keys(&[key.clone()]).await.unwrap();
//! assert_eq!(store.load_keys().await.unwrap(), vec![key]);
//! # });
//! ```
//!
//! # Feature Flags
//!
//! - **`testutil`**: assertion macros for [`StorageResult`] values.
//! - **`failpoints`**: activates the `issuer-keys-before-write` fail point in
//!   [`FileIssuerKeyStore`].

#![deny(unsafe_code)]

pub mod error;
pub mod file;
pub mod issuer_key;
pub mod store;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;

pub use error::{BoxError, StorageError, StorageResult};
pub use file::{FileIssuerKeyStore, PUBKEYS_FILENAME};
pub use issuer_key::IssuerKey;
pub use store::{IssuerKeyStore, MemoryIssuerKeyStore};
