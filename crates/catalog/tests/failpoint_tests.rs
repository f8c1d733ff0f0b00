#![allow(clippy::expect_used, clippy::panic)]
//! Fail-point injection through the catalog's administrative path.
//!
//! These tests require the `failpoints` feature:
//! ```bash
//! cargo test -p xdb-common-catalog --features failpoints --test failpoint_tests
//! ```

use std::sync::Arc;

use chrono::Duration;
use xdb_common_authn::{AuthError, testutil::TestIssuer};
use xdb_common_catalog::{
    Catalog, CatalogConfig, CatalogError,
    testutil::{MASTER_ISSUER, lca_provider},
};
use xdb_common_storage::{FileIssuerKeyStore, IssuerKeyStore};

#[tokio::test]
async fn update_issuer_persistence_failure_is_fatal_but_kept_in_memory() {
    let scenario = fail::FailScenario::setup();
    let dir = tempfile::tempdir().expect("tempdir");
    let master = TestIssuer::new(MASTER_ISSUER);
    let store = FileIssuerKeyStore::in_root(dir.path());
    store.save_keys(&[master.key(Duration::days(1))]).await.expect("seed");

    let config = CatalogConfig::builder().root(dir.path()).master_issuer(MASTER_ISSUER).build();
    let catalog = Catalog::open(config, Arc::new(lca_provider())).await.expect("open");

    fail::cfg("issuer-keys-before-write", "return").expect("failed to configure fail point");
    let token = master.command_token("admin", "update_issuer:blackbook");
    let err = catalog
        .update_issuer("blackbook", TestIssuer::new("blackbook").key(Duration::days(1)), Some(&token))
        .await
        .expect_err("write must fail");

    assert!(matches!(err, CatalogError::Auth(AuthError::KeyStorageError(_))), "got {err:?}");
    assert_eq!(err.status_code(), 500);
    assert!(catalog.registry().get("blackbook").is_some(), "in-memory update must survive");

    let persisted = store.load_keys().await.expect("load");
    assert_eq!(persisted.len(), 1, "file still holds only the master key");

    scenario.teardown();
}
