use std::collections::BTreeSet;
use std::sync::Arc;

use etl::aggregator::{EventAggregator, PostgresProgressStore, ProgressStore, RecordOutcome};
use etl::test_utils::database::spawn_database;
use etl::types::{DispatchDecision, ObjectKind, RequiredObjectSet, SyncEvent};
use telemetry::init_test_tracing;

#[tokio::test(flavor = "multi_thread")]
async fn progress_survives_a_new_store_instance() {
    init_test_tracing();
    let database = spawn_database().await;
    let required = RequiredObjectSet::default();

    let store = PostgresProgressStore::new(database.pool.clone());
    store
        .record_success("conn", ObjectKind::Contact, &required)
        .await
        .unwrap();
    store
        .record_success("conn", ObjectKind::Opportunity, &required)
        .await
        .unwrap();

    let restarted = PostgresProgressStore::new(database.pool.clone());
    let outcome = restarted
        .record_success("conn", ObjectKind::Account, &required)
        .await
        .unwrap();

    assert!(matches!(outcome, RecordOutcome::Completed(_)));
    assert!(restarted.progress("conn").await.unwrap().is_empty());

    database.cleanup().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_events_dispatch_exactly_once() {
    init_test_tracing();
    let database = spawn_database().await;
    let aggregator = EventAggregator::new(
        Arc::new(PostgresProgressStore::new(database.pool.clone())),
        RequiredObjectSet::default(),
    );

    let mut handles = Vec::new();
    for kind in [ObjectKind::Contact, ObjectKind::Opportunity, ObjectKind::Account] {
        let aggregator = aggregator.clone();
        handles.push(tokio::spawn(async move {
            aggregator
                .record(&SyncEvent::success("conn", kind))
                .await
                .unwrap()
        }));
    }

    let mut dispatches = 0;
    for handle in handles {
        if handle.await.unwrap() == DispatchDecision::Dispatch {
            dispatches += 1;
        }
    }

    assert_eq!(dispatches, 1);

    database.cleanup().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn restore_adds_kinds_back() {
    init_test_tracing();
    let database = spawn_database().await;
    let store = PostgresProgressStore::new(database.pool.clone());

    store
        .restore(
            "conn",
            &BTreeSet::from([ObjectKind::Contact, ObjectKind::Account]),
        )
        .await
        .unwrap();

    assert_eq!(
        store.progress("conn").await.unwrap(),
        BTreeSet::from([ObjectKind::Contact, ObjectKind::Account])
    );

    database.cleanup().await;
}
