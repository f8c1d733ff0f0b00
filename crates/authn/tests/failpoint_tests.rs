#![allow(clippy::expect_used, clippy::panic)]
//! Integration tests for fail-point injection in the authn crate.
//!
//! These tests require the `failpoints` feature:
//! ```bash
//! cargo test -p xdb-common-authn --features failpoints --test failpoint_tests
//! ```

use std::sync::Arc;

use chrono::Duration;
use xdb_common_authn::{IssuerRegistry, assert_auth_error, testutil::TestIssuer};
use xdb_common_storage::{FileIssuerKeyStore, IssuerKeyStore};

#[tokio::test]
async fn registry_write_failure_keeps_memory_update() {
    let scenario = fail::FailScenario::setup();
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(FileIssuerKeyStore::in_root(dir.path()));
    let registry = IssuerRegistry::load(store.clone()).await.expect("load");

    fail::cfg("issuer-keys-before-write", "return").expect("failed to configure fail point");
    let result = registry.update(TestIssuer::new("blackbook").key(Duration::days(1))).await;

    assert_auth_error!(result, KeyStorageError);
    assert!(registry.get("blackbook").is_some(), "in-memory update must survive");
    assert!(store.load_keys().await.expect("load").is_empty(), "nothing was persisted");

    scenario.teardown();
}

#[tokio::test]
async fn next_successful_update_persists_earlier_one() {
    let scenario = fail::FailScenario::setup();
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(FileIssuerKeyStore::in_root(dir.path()));
    let registry = IssuerRegistry::load(store.clone()).await.expect("load");

    fail::cfg("issuer-keys-before-write", "return").expect("failed to configure fail point");
    let _ = registry.update(TestIssuer::new("a").key(Duration::days(1))).await;
    fail::remove("issuer-keys-before-write");

    registry.update(TestIssuer::new("b").key(Duration::days(1))).await.expect("update");

    let persisted: Vec<String> =
        store.load_keys().await.expect("load").into_iter().map(|k| k.issuer).collect();
    assert_eq!(persisted, vec!["a".to_owned(), "b".to_owned()]);

    scenario.teardown();
}
