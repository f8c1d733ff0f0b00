//! Authorization and metering behavior of request-scoped queries.
#![allow(clippy::expect_used, clippy::panic)]

use serde_json::json;
use xdb_common_authn::{Grant, Interface, testutil::TestIssuer};
use xdb_common_catalog::{
    AccessError, CounterKey, Operation, QueryArgs, QueryError, UsageCounter, assert_access_error,
    testutil::{QDB, TestCatalog, USLCI, USLCI2},
};

fn grant(origin: &str, access: Interface, values: bool) -> Grant {
    Grant::builder().user("alice").origin(origin).access(access).values(values).build()
}

#[tokio::test]
async fn prefix_grant_authorizes_sub_origin() {
    let env = TestCatalog::new().await;
    let query = env
        .catalog
        .query(USLCI, vec![grant("lcacommons.uslci", Interface::Exchange, false)])
        .expect("query");

    let result = query.exchanges(QueryArgs::entity("electricity")).await.expect("authorized");
    assert_eq!(result, json!([{"flow": "coal", "direction": "Input"}]));
}

#[tokio::test]
async fn false_prefix_grant_is_not_authorized() {
    let env = TestCatalog::new().await;
    let query = env
        .catalog
        .query(USLCI, vec![grant("lcacommons.uslci2", Interface::Exchange, true)])
        .expect("query");

    let result = query.exchanges(QueryArgs::entity("electricity")).await;

    assert_access_error!(result, InterfaceNotAuthorized);
    assert!(env.catalog.meter().is_empty());
    assert!(env.provider.calls().is_empty(), "refused call must not be forwarded");
}

#[tokio::test]
async fn sibling_origin_is_covered_by_string_prefix() {
    let env = TestCatalog::new().await;
    let query = env
        .catalog
        .query(USLCI2, vec![grant("lcacommons.uslci", Interface::Exchange, false)])
        .expect("query");

    query.exchanges(QueryArgs::entity("diesel")).await.expect("string prefix authorizes");
}

#[tokio::test]
async fn not_authorized_error_names_origin_and_interface() {
    let env = TestCatalog::new().await;
    let query = env.catalog.query(USLCI, Vec::<Grant>::new()).expect("query");

    let err = query.lci(QueryArgs::entity("electricity")).await.expect_err("no grant");

    match err {
        QueryError::Access(AccessError::InterfaceNotAuthorized { origin, interface }) => {
            assert_eq!(origin, USLCI);
            assert_eq!(interface, Interface::Background);
        },
        other => panic!("expected InterfaceNotAuthorized, got {other:?}"),
    }
}

#[tokio::test]
async fn public_interfaces_pass_without_grant_unmetered() {
    let env = TestCatalog::new().await;
    let query = env.catalog.query(USLCI, Vec::<Grant>::new()).expect("query");

    let record = query.get(QueryArgs::entity("electricity")).await.expect("basic is public");
    assert_eq!(record["name"], "Electricity, at grid");
    let count = query.count(QueryArgs::new()).await.expect("index is public");
    assert_eq!(count, json!(1));

    assert!(env.catalog.meter().is_empty(), "public calls without a grant are not metered");
    assert_eq!(env.provider.calls().len(), 2);
}

#[tokio::test]
async fn public_interface_with_grant_is_metered() {
    let env = TestCatalog::new().await;
    let g = grant("lcacommons", Interface::Index, false);
    let query = env.catalog.query(USLCI, vec![g.clone()]).expect("query");

    query.count(QueryArgs::new()).await.expect("count");

    let usage = env.catalog.meter().usage(&CounterKey::for_grant(&g)).expect("counter");
    assert_eq!(usage.access_count, 1);
}

#[tokio::test]
async fn values_operation_without_values_flag_is_denied_and_uncounted() {
    let env = TestCatalog::new().await;
    let g = grant("lcacommons.uslci", Interface::Exchange, false);
    let query = env.catalog.query(USLCI, vec![g.clone()]).expect("query");

    let result = query.exchange_values(QueryArgs::entity("electricity")).await;

    assert_access_error!(result, ValuesAccessDenied);
    assert!(env.catalog.meter().usage(&CounterKey::for_grant(&g)).is_none());
    assert!(env.provider.calls().is_empty());
}

#[tokio::test]
async fn values_calls_count_access_and_values() {
    let env = TestCatalog::new().await;
    let g = grant("lcacommons.uslci", Interface::Exchange, true);
    let query = env.catalog.query(USLCI, vec![g.clone()]).expect("query");

    for _ in 0..5 {
        query.exchange_values(QueryArgs::entity("electricity")).await.expect("values");
    }
    query.exchanges(QueryArgs::entity("electricity")).await.expect("access");

    let usage = env.catalog.meter().usage(&CounterKey::for_grant(&g)).expect("counter");
    assert_eq!(usage, UsageCounter { access_count: 6, values_count: 5, update_count: 0 });
}

#[tokio::test]
async fn exchange_lci_requires_values_on_the_exchange_grant() {
    let env = TestCatalog::new().await;
    let reader = grant("lcacommons.uslci", Interface::Exchange, false);
    let query = env.catalog.query(USLCI, vec![reader]).expect("query");
    let denied = query.exchange_lci(QueryArgs::entity("electricity")).await;
    assert_access_error!(denied, ValuesAccessDenied);

    let g = grant("lcacommons.uslci", Interface::Exchange, true);
    let query = env.catalog.query(USLCI, vec![g.clone()]).expect("query");
    query.exchange_lci(QueryArgs::entity("electricity")).await.expect("values granted");

    let usage = env.catalog.meter().usage(&CounterKey::for_grant(&g)).expect("counter");
    assert_eq!(usage, UsageCounter { access_count: 1, values_count: 1, update_count: 0 });
    let calls = env.provider.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].operation, Operation::ExchangeLci);
}

#[tokio::test]
async fn counters_are_keyed_by_grant_origin() {
    let env = TestCatalog::new().await;
    let g = grant("lcacommons", Interface::Exchange, false);

    for origin in [USLCI, USLCI2] {
        let query = env.catalog.query(origin, vec![g.clone()]).expect("query");
        query.exchanges(QueryArgs::new()).await.expect("exchanges");
    }

    assert_eq!(env.catalog.meter().len(), 1);
    let usage = env.catalog.meter().usage(&CounterKey::for_grant(&g)).expect("counter");
    assert_eq!(usage.access_count, 2);
}

#[tokio::test]
async fn exempt_operations_skip_authorization_and_metering() {
    let env = TestCatalog::new().await;

    let qdb = env.catalog.query(QDB, Vec::<Grant>::new()).expect("query");
    assert!(qdb.is_lcia_engine().await.expect("exempt"));

    let uslci = env.catalog.query(USLCI, Vec::<Grant>::new()).expect("query");
    assert!(!uslci.check_bg().await.expect("exempt without background grant"));

    assert!(env.catalog.meter().is_empty());
}

#[tokio::test]
async fn background_engine_gets_unmetered_query() {
    let env = TestCatalog::new().await;
    let g = grant("lcacommons.uslci", Interface::Background, true);
    let query = env.catalog.query(USLCI, vec![g.clone()]).expect("query");

    query.setup_background().await.expect("setup");
    assert!(query.check_bg().await.expect("check_bg"));

    for _ in 0..3 {
        env.provider.run_background(USLCI, Operation::Exchanges).await.expect("internal call");
    }
    assert!(env.catalog.meter().is_empty(), "internal background calls must not be metered");

    let lci = query.lci(QueryArgs::entity("electricity")).await.expect("lci");
    assert_eq!(lci, json!([{"flow": "co2", "value": 0.9}]));
    let usage = env.catalog.meter().usage(&CounterKey::for_grant(&g)).expect("counter");
    assert_eq!(usage, UsageCounter { access_count: 1, values_count: 1, update_count: 0 });
}

#[tokio::test]
async fn issued_token_end_to_end() {
    let blackbook = TestIssuer::new("blackbook");
    let env = TestCatalog::with_issuers(&[&blackbook]).await;
    let token = blackbook.grant_token("alice", "lcacommons.uslci:exchange:v qdb:quantity");

    let query = env.catalog.authorized_query(USLCI, Some(&token)).expect("query");
    assert_eq!(query.authorized_interfaces().into_iter().collect::<Vec<_>>(), vec![
        Interface::Exchange
    ]);
    query.exchange_values(QueryArgs::entity("electricity")).await.expect("values granted");

    let qdb = env.catalog.authorized_query(QDB, Some(&token)).expect("query");
    qdb.factors(QueryArgs::entity("co2")).await.expect("access granted");
    assert_access_error!(qdb.cf(QueryArgs::entity("co2")).await, ValuesAccessDenied);

    let lines: Vec<_> = env.catalog.meter().invoice("alice").collect();
    assert_eq!(lines.len(), 2);
}

#[tokio::test]
async fn unknown_origin_is_reported() {
    let env = TestCatalog::new().await;
    let err = env.catalog.query("ecoinvent.3.8", Vec::<Grant>::new()).expect_err("unknown");
    assert_eq!(err.status_code(), 404);
}
