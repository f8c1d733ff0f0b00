//! Shared test utilities for issuer key storage.
//!
//! Feature-gated behind `testutil` so it never leaks into production builds.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! xdb-common-storage = { path = "../storage", features = ["testutil"] }
//! ```
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use xdb_common_storage::testutil::{make_issuer_key, seeded_store};
//! ```

use chrono::{Duration, Utc};

use crate::{
    IssuerKeyStore,
    error::{StorageError, StorageResult},
    issuer_key::IssuerKey,
    store::MemoryIssuerKeyStore,
};

/// Placeholder key material. Storage never parses it.
pub const PLACEHOLDER_PUBLIC_KEY: &str = "11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo";

/// Creates an issuer key with placeholder material that expires `valid_for`
/// from now. A negative duration yields an already-expired key.
#[must_use]
pub fn make_issuer_key(issuer: &str, valid_for: Duration) -> IssuerKey {
    IssuerKey::builder()
        .issuer(issuer)
        .public_key(PLACEHOLDER_PUBLIC_KEY)
        .expiry(Utc::now() + valid_for)
        .build()
}

/// Creates a [`MemoryIssuerKeyStore`] holding one 30-day key per issuer.
///
/// # Panics
///
/// Panics if seeding fails (should not happen with the in-memory store).
pub async fn seeded_store(issuers: &[&str]) -> MemoryIssuerKeyStore {
    let store = MemoryIssuerKeyStore::new();
    let keys: Vec<IssuerKey> =
        issuers.iter().map(|issuer| make_issuer_key(issuer, Duration::days(30))).collect();
    store.save_keys(&keys).await.expect("seeding in-memory store failed");
    store
}

/// Assert that a [`StorageResult`] is a [`StorageError::NotFound`].
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use xdb_common_storage::assert_not_found;
/// use xdb_common_storage::error::{StorageError, StorageResult};
///
/// let result: StorageResult<()> = Err(StorageError::not_found("missing"));
/// assert_not_found!(result);
/// ```
#[macro_export]
macro_rules! assert_not_found {
    ($result:expr) => {
        assert!(
            matches!($result, Err($crate::error::StorageError::NotFound { .. })),
            "expected StorageError::NotFound, got: {:?}",
            $result,
        );
    };
    ($result:expr, $msg:expr) => {
        assert!(
            matches!($result, Err($crate::error::StorageError::NotFound { .. })),
            "{}: expected StorageError::NotFound, got: {:?}",
            $msg,
            $result,
        );
    };
}

/// Assert that a [`StorageResult`] is `Ok` and return the inner value.
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use xdb_common_storage::assert_storage_ok;
/// use xdb_common_storage::error::StorageResult;
///
/// let result: StorageResult<i32> = Ok(42);
/// assert_eq!(assert_storage_ok!(result), 42);
/// ```
#[macro_export]
macro_rules! assert_storage_ok {
    ($result:expr) => {
        match $result {
            Ok(val) => val,
            Err(e) => panic!("expected Ok, got StorageError: {e:?}"),
        }
    };
    ($result:expr, $msg:expr) => {
        match $result {
            Ok(val) => val,
            Err(e) => panic!("{}: expected Ok, got StorageError: {e:?}", $msg),
        }
    };
}

/// Returns `true` if the result is an `Internal` error.
pub fn is_internal<T>(result: &StorageResult<T>) -> bool {
    matches!(result, Err(StorageError::Internal { .. }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_issuer_key_expiry_direction() {
        assert!(!make_issuer_key("fresh", Duration::hours(1)).is_expired());
        assert!(make_issuer_key("stale", Duration::hours(-1)).is_expired());
    }

    #[tokio::test]
    async fn test_seeded_store() {
        let store = seeded_store(&["a", "b"]).await;
        let keys = assert_storage_ok!(store.load_keys().await);
        assert_eq!(keys.len(), 2);
        assert_eq!(store.save_count(), 1);
    }

    #[test]
    fn test_assert_not_found_macro() {
        let result: StorageResult<()> = Err(StorageError::not_found("missing"));
        assert_not_found!(result);
    }

    #[test]
    fn test_is_internal() {
        assert!(is_internal::<()>(&Err(StorageError::internal("boom"))));
        assert!(!is_internal::<()>(&Ok(())));
    }
}
