use config::shared::MergeConfig;
use etl::error::ErrorKind;
use etl::merge::{MergeEngine, MergePlan};
use etl::test_utils::database::spawn_database;
use etl::test_utils::staging::{
    DestinationContact, StagedContact, count_rows, create_staging_tables,
    destination_associations, destination_contacts, insert_account, insert_contact,
    insert_opportunity, table_snapshot,
};
use telemetry::init_test_tracing;

const DESTINATION_TABLES: [&str; 4] = [
    "public.contacts",
    "public.opportunities",
    "public.accounts",
    "public.entity_accounts",
];

fn engine(pool: &sqlx::PgPool) -> MergeEngine {
    MergeEngine::new(pool.clone(), MergePlan::crm(&MergeConfig::default()))
}

async fn snapshot_destination(pool: &sqlx::PgPool) -> Vec<Vec<String>> {
    let mut snapshot = Vec::new();
    for table in DESTINATION_TABLES {
        snapshot.push(table_snapshot(pool, table).await);
    }

    snapshot
}

#[tokio::test(flavor = "multi_thread")]
async fn merge_inserts_staged_rows_and_associations() {
    init_test_tracing();
    let database = spawn_database().await;
    create_staging_tables(&database.pool).await;

    insert_contact(
        &database.pool,
        &StagedContact {
            email: Some("ada@example.com"),
            phone: Some("111"),
            account_id: Some("acc-1"),
            ..StagedContact::new("c-1", "cust-1", "Ada")
        },
    )
    .await;
    insert_contact(&database.pool, &StagedContact::new("c-2", "cust-1", "Grace")).await;
    insert_opportunity(&database.pool, "o-1", "cust-1", "Renewal", Some("acc-1")).await;
    insert_account(&database.pool, "acc-1", "cust-1", "Acme").await;

    let report = engine(&database.pool).run_merge().await.unwrap();

    assert_eq!(report.rows_upserted["contacts"], 2);
    assert_eq!(report.rows_upserted["opportunities"], 1);
    assert_eq!(report.rows_upserted["accounts"], 1);
    assert_eq!(
        destination_contacts(&database.pool).await,
        vec![
            DestinationContact {
                source_id: "c-1".to_string(),
                customer_id: "cust-1".to_string(),
                first_name: Some("Ada".to_string()),
                email: Some("ada@example.com".to_string()),
                phone: Some("111".to_string()),
            },
            DestinationContact {
                source_id: "c-2".to_string(),
                customer_id: "cust-1".to_string(),
                first_name: Some("Grace".to_string()),
                email: None,
                phone: None,
            },
        ]
    );
    assert_eq!(
        destination_associations(&database.pool).await,
        vec![
            ("c-1".to_string(), "acc-1".to_string(), "contact".to_string()),
            ("o-1".to_string(), "acc-1".to_string(), "opportunity".to_string()),
        ]
    );

    database.cleanup().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn merge_is_idempotent() {
    init_test_tracing();
    let database = spawn_database().await;
    create_staging_tables(&database.pool).await;

    insert_contact(
        &database.pool,
        &StagedContact {
            email: Some("ada@example.com"),
            phone: Some("111"),
            account_id: Some("acc-1"),
            ..StagedContact::new("c-1", "cust-1", "Ada")
        },
    )
    .await;
    insert_opportunity(&database.pool, "o-1", "cust-1", "Renewal", Some("acc-1")).await;
    insert_account(&database.pool, "acc-1", "cust-1", "Acme").await;

    let engine = engine(&database.pool);
    engine.run_merge().await.unwrap();
    let first = snapshot_destination(&database.pool).await;
    // Lets `now()` move on, so a rewritten row would show a new `merged_at`.
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let second = engine.run_merge().await.unwrap();

    assert_eq!(snapshot_destination(&database.pool).await, first);
    assert_eq!(second.total_rows_upserted(), 0);
    assert!(second.associations_inserted.values().all(|count| *count == 0));
    assert_eq!(count_rows(&database.pool, "public.entity_accounts").await, 2);

    database.cleanup().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn latest_emitted_duplicate_wins() {
    init_test_tracing();
    let database = spawn_database().await;
    create_staging_tables(&database.pool).await;

    insert_contact(
        &database.pool,
        &StagedContact {
            emitted_secs_ago: 60.0,
            ..StagedContact::new("c-1", "cust-1", "Old")
        },
    )
    .await;
    insert_contact(
        &database.pool,
        &StagedContact {
            emitted_secs_ago: 1.0,
            ..StagedContact::new("c-1", "cust-1", "New")
        },
    )
    .await;

    engine(&database.pool).run_merge().await.unwrap();

    let contacts = destination_contacts(&database.pool).await;
    assert_eq!(contacts.len(), 1);
    assert_eq!(contacts[0].first_name.as_deref(), Some("New"));

    database.cleanup().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn remerge_with_updated_phone_overwrites_the_row() {
    init_test_tracing();
    let database = spawn_database().await;
    create_staging_tables(&database.pool).await;
    let engine = engine(&database.pool);

    insert_contact(
        &database.pool,
        &StagedContact {
            phone: Some("111"),
            ..StagedContact::new("c1", "cust1", "Ada")
        },
    )
    .await;
    engine.run_merge().await.unwrap();

    sqlx::query("truncate supaglue.crm_contacts")
        .execute(&database.pool)
        .await
        .unwrap();
    insert_contact(
        &database.pool,
        &StagedContact {
            phone: Some("222"),
            ..StagedContact::new("c1", "cust1", "Ada")
        },
    )
    .await;
    let report = engine.run_merge().await.unwrap();

    assert_eq!(report.rows_upserted["contacts"], 1);
    assert_eq!(
        destination_contacts(&database.pool).await,
        vec![DestinationContact {
            source_id: "c1".to_string(),
            customer_id: "cust1".to_string(),
            first_name: Some("Ada".to_string()),
            email: None,
            phone: Some("222".to_string()),
        }]
    );

    database.cleanup().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn same_source_id_for_different_customers_are_distinct_rows() {
    init_test_tracing();
    let database = spawn_database().await;
    create_staging_tables(&database.pool).await;

    insert_contact(&database.pool, &StagedContact::new("c-1", "cust-1", "Ada")).await;
    insert_contact(&database.pool, &StagedContact::new("c-1", "cust-2", "Grace")).await;

    engine(&database.pool).run_merge().await.unwrap();

    assert_eq!(count_rows(&database.pool, "public.contacts").await, 2);

    database.cleanup().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_staging_table_is_a_schema_mismatch() {
    init_test_tracing();
    let database = spawn_database().await;

    let err = engine(&database.pool).run_merge().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::StagingSchemaMismatch);
    // The destination tables created in the failed transaction are rolled back too.
    let contacts_exists: bool =
        sqlx::query_scalar("select to_regclass('public.contacts') is not null")
            .fetch_one(&database.pool)
            .await
            .unwrap();
    assert!(!contacts_exists);

    database.cleanup().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_merges_are_serialized() {
    init_test_tracing();
    let database = spawn_database().await;
    create_staging_tables(&database.pool).await;
    insert_contact(&database.pool, &StagedContact::new("c-1", "cust-1", "Ada")).await;
    insert_account(&database.pool, "acc-1", "cust-1", "Acme").await;

    let engine = engine(&database.pool);
    let first = tokio::spawn({
        let engine = engine.clone();
        async move { engine.run_merge().await }
    });
    let second = tokio::spawn({
        let engine = engine.clone();
        async move { engine.run_merge().await }
    });

    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    assert_eq!(count_rows(&database.pool, "public.contacts").await, 1);
    assert_eq!(count_rows(&database.pool, "public.accounts").await, 1);

    database.cleanup().await;
}
