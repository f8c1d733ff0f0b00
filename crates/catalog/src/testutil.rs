//! Shared test utilities for catalog testing.
//!
//! Provides a seeded [`MemoryProvider`] and a [`TestCatalog`] wired to an
//! in-memory issuer key store with a registered master issuer. Feature-gated
//! behind `testutil`.
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use xdb_common_catalog::testutil::TestCatalog;
//!
//! # async fn example() {
//! let env = TestCatalog::new().await;
//! let token = env.master.grant_token("admin", "");
//! let grants = env.catalog.grants(Some(&token)).expect("master grants");
//! # }
//! ```

use std::sync::Arc;

use chrono::Duration;
use serde_json::json;
use xdb_common_authn::{Interface, testutil::TestIssuer};
use xdb_common_storage::{IssuerKeyStore, MemoryIssuerKeyStore};

use crate::{catalog::Catalog, config::CatalogConfig, memory::MemoryProvider, operation::Operation};

/// Master issuer name used by [`TestCatalog`].
pub const MASTER_ISSUER: &str = "xdb-master";

/// Origin with every interface.
pub const USLCI: &str = "lcacommons.uslci.fy2021.q1";
/// Sibling origin sharing the `lcacommons.uslci` string prefix.
pub const USLCI2: &str = "lcacommons.uslci2";
/// Quantity-only LCIA engine origin.
pub const QDB: &str = "qdb";

/// Provider with three origins:
///
/// | origin | interfaces |
/// |--------|------------|
/// | `lcacommons.uslci.fy2021.q1` | index, basic, exchange, background |
/// | `lcacommons.uslci2` | index, exchange |
/// | `qdb` | index, quantity (LCIA engine) |
#[must_use]
pub fn lca_provider() -> MemoryProvider {
    let provider = MemoryProvider::new();

    provider.add_origin(
        USLCI,
        [Interface::Index, Interface::Basic, Interface::Exchange, Interface::Background],
    );
    provider.add_entity(
        USLCI,
        "electricity",
        json!({"uuid": "electricity", "name": "Electricity, at grid", "reference": "kWh"}),
    );
    provider.set_fixture(
        USLCI,
        Operation::Exchanges,
        json!([{"flow": "coal", "direction": "Input"}]),
    );
    provider.set_fixture(
        USLCI,
        Operation::ExchangeValues,
        json!([{"flow": "coal", "value": 0.42}]),
    );
    provider.set_fixture(USLCI, Operation::Lci, json!([{"flow": "co2", "value": 0.9}]));

    provider.add_origin(USLCI2, [Interface::Index, Interface::Exchange]);
    provider.add_entity(USLCI2, "diesel", json!({"uuid": "diesel", "name": "Diesel"}));

    provider.add_origin(QDB, [Interface::Index, Interface::Quantity]);
    provider.set_lcia_engine(QDB, true);
    provider.set_fixture(QDB, Operation::Cf, json!(1.0));
    provider.set_fixture(QDB, Operation::Factors, json!([{"flowable": "co2", "value": 1.0}]));

    provider
}

/// A catalog over [`lca_provider`] with an in-memory key store.
pub struct TestCatalog {
    /// The catalog under test.
    pub catalog: Arc<Catalog>,
    /// The provider behind it.
    pub provider: MemoryProvider,
    /// The issuer key store behind its registry.
    pub store: MemoryIssuerKeyStore,
    /// The registered master issuer.
    pub master: TestIssuer,
}

impl TestCatalog {
    /// Opens a catalog whose registry holds only the master issuer.
    ///
    /// # Panics
    ///
    /// Panics if the catalog cannot be opened.
    pub async fn new() -> Self {
        Self::with_issuers(&[]).await
    }

    /// Opens a catalog whose registry holds the master issuer and `issuers`,
    /// each valid for a day.
    ///
    /// # Panics
    ///
    /// Panics if the catalog cannot be opened.
    pub async fn with_issuers(issuers: &[&TestIssuer]) -> Self {
        let master = TestIssuer::new(MASTER_ISSUER);
        let mut keys = vec![master.key(Duration::days(1))];
        keys.extend(issuers.iter().map(|issuer| issuer.key(Duration::days(1))));

        let store = MemoryIssuerKeyStore::new();
        store.save_keys(&keys).await.expect("seed key store");

        let provider = lca_provider();
        let config = CatalogConfig::builder()
            .root("/nonexistent/xdb")
            .master_issuer(MASTER_ISSUER)
            .meter_log_interval(0)
            .build();
        let catalog = Catalog::with_store(config, Arc::new(provider.clone()), Arc::new(store.clone()))
            .await
            .expect("open catalog");

        Self { catalog: Arc::new(catalog), provider, store, master }
    }
}

/// Asserts that a `Result<T, QueryError>` is a refused call of the given
/// [`AccessError`](crate::AccessError) variant.
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use xdb_common_catalog::{AccessError, QueryError, assert_access_error};
///
/// let result: Result<(), QueryError> =
///     Err(AccessError::ValuesAccessDenied { grant: "g".into() }.into());
/// assert_access_error!(result, ValuesAccessDenied);
/// ```
#[macro_export]
macro_rules! assert_access_error {
    ($result:expr, $variant:ident) => {
        assert!(
            matches!(
                $result,
                Err($crate::QueryError::Access($crate::AccessError::$variant { .. }))
            ),
            "expected AccessError::{}, got: {:?}",
            stringify!($variant),
            $result,
        );
    };
}
