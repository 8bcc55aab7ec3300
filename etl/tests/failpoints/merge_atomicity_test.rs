use std::sync::Arc;
use std::time::Duration;

use config::shared::MergeConfig;
use etl::concurrency::shutdown::create_shutdown_channel;
use etl::error::ErrorKind;
use etl::failpoints::{MERGE_AFTER_CONTACTS_UPSERT, WORKER_AFTER_CLAIM};
use etl::merge::{MergeEngine, MergePlan};
use etl::queue::{JobQueue, MergeJob, PostgresJobQueue, RetryPolicy};
use etl::test_utils::database::spawn_database;
use etl::test_utils::staging::{
    StagedContact, count_rows, create_staging_tables, destination_contacts, insert_account,
    insert_contact, table_snapshot,
};
use etl::workers::merge::MergeWorker;
use fail::FailScenario;
use telemetry::init_test_tracing;

#[tokio::test(flavor = "multi_thread")]
async fn failure_after_contacts_upsert_rolls_back_everything() {
    init_test_tracing();
    let scenario = FailScenario::setup();
    fail::cfg(MERGE_AFTER_CONTACTS_UPSERT, "return").unwrap();

    let database = spawn_database().await;
    create_staging_tables(&database.pool).await;
    insert_contact(&database.pool, &StagedContact::new("c-1", "cust-1", "Ada")).await;
    insert_account(&database.pool, "acc-1", "cust-1", "Acme").await;

    let engine = MergeEngine::new(database.pool.clone(), MergePlan::crm(&MergeConfig::default()));
    let err = engine.run_merge().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FailPoint);

    let contacts_exists: bool =
        sqlx::query_scalar("select to_regclass('public.contacts') is not null")
            .fetch_one(&database.pool)
            .await
            .unwrap();
    assert!(!contacts_exists);

    fail::remove(MERGE_AFTER_CONTACTS_UPSERT);
    engine.run_merge().await.unwrap();
    assert_eq!(count_rows(&database.pool, "public.contacts").await, 1);
    assert_eq!(count_rows(&database.pool, "public.accounts").await, 1);

    scenario.teardown();
    database.cleanup().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn failure_after_contacts_upsert_keeps_existing_rows_unchanged() {
    init_test_tracing();
    let scenario = FailScenario::setup();

    let database = spawn_database().await;
    create_staging_tables(&database.pool).await;
    insert_contact(
        &database.pool,
        &StagedContact {
            phone: Some("111"),
            ..StagedContact::new("c-1", "cust-1", "Ada")
        },
    )
    .await;
    insert_account(&database.pool, "acc-1", "cust-1", "Acme").await;

    let engine = MergeEngine::new(database.pool.clone(), MergePlan::crm(&MergeConfig::default()));
    engine.run_merge().await.unwrap();
    let contacts_before = table_snapshot(&database.pool, "public.contacts").await;
    let accounts_before = table_snapshot(&database.pool, "public.accounts").await;

    sqlx::query("truncate supaglue.crm_contacts")
        .execute(&database.pool)
        .await
        .unwrap();
    insert_contact(
        &database.pool,
        &StagedContact {
            phone: Some("222"),
            ..StagedContact::new("c-1", "cust-1", "Ada")
        },
    )
    .await;
    insert_contact(&database.pool, &StagedContact::new("c-2", "cust-1", "Grace")).await;

    fail::cfg(MERGE_AFTER_CONTACTS_UPSERT, "return").unwrap();
    let err = engine.run_merge().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FailPoint);

    assert_eq!(
        table_snapshot(&database.pool, "public.contacts").await,
        contacts_before
    );
    assert_eq!(
        table_snapshot(&database.pool, "public.accounts").await,
        accounts_before
    );

    fail::remove(MERGE_AFTER_CONTACTS_UPSERT);
    engine.run_merge().await.unwrap();
    let contacts = destination_contacts(&database.pool).await;
    assert_eq!(contacts.len(), 2);
    assert_eq!(contacts[0].phone.as_deref(), Some("222"));

    scenario.teardown();
    database.cleanup().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn worker_failure_requeues_the_job() {
    init_test_tracing();
    let scenario = FailScenario::setup();
    fail::cfg(WORKER_AFTER_CLAIM, "1*return").unwrap();

    let database = spawn_database().await;
    create_staging_tables(&database.pool).await;
    insert_contact(&database.pool, &StagedContact::new("c-1", "cust-1", "Ada")).await;

    let queue = Arc::new(PostgresJobQueue::new(
        database.pool.clone(),
        Duration::from_secs(60),
        RetryPolicy::new(3, Duration::ZERO, Duration::ZERO, 0),
    ));
    let engine = Arc::new(MergeEngine::new(
        database.pool.clone(),
        MergePlan::crm(&MergeConfig::default()),
    ));
    let handle = queue.enqueue(MergeJob::new("conn-1")).await.unwrap();

    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let worker = MergeWorker::new(
        0,
        queue.clone(),
        engine,
        Duration::from_millis(10),
        shutdown_rx,
    );

    assert!(worker.process_next().await.unwrap());
    assert_eq!(queue.stats().await.unwrap().pending, 1);
    assert!(queue.last_error(handle.id).await.unwrap().is_some());

    assert!(worker.process_next().await.unwrap());
    assert_eq!(queue.stats().await.unwrap().completed, 1);
    assert_eq!(count_rows(&database.pool, "public.contacts").await, 1);

    scenario.teardown();
    database.cleanup().await;
}
