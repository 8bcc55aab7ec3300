use std::time::Duration;

use etl::queue::{
    FailureOutcome, JobQueue, LEASE_EXPIRED_ERROR, MergeJob, PostgresJobQueue, QueueStats,
    RetryPolicy,
};
use etl::test_utils::database::spawn_database;
use etl::workers::policy::RetryDirective;
use telemetry::init_test_tracing;

fn no_backoff(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts, Duration::ZERO, Duration::ZERO, 0)
}

#[tokio::test(flavor = "multi_thread")]
async fn enqueued_job_is_claimed_and_completed() {
    init_test_tracing();
    let database = spawn_database().await;
    let queue = PostgresJobQueue::new(database.pool.clone(), Duration::from_secs(60), no_backoff(3));

    let handle = queue.enqueue(MergeJob::new("conn-1")).await.unwrap();
    let claimed = queue.claim().await.unwrap().unwrap();

    assert_eq!(claimed.id, handle.id);
    assert_eq!(claimed.job, MergeJob::new("conn-1"));
    assert_eq!(claimed.attempt, 1);
    assert!(queue.claim().await.unwrap().is_none());

    queue.complete(claimed.id).await.unwrap();
    assert_eq!(
        queue.stats().await.unwrap(),
        QueueStats {
            completed: 1,
            ..Default::default()
        }
    );

    database.cleanup().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_job_is_retried_then_dead_lettered() {
    init_test_tracing();
    let database = spawn_database().await;
    let queue = PostgresJobQueue::new(database.pool.clone(), Duration::from_secs(60), no_backoff(2));
    let handle = queue.enqueue(MergeJob::new("conn-1")).await.unwrap();

    let first = queue.claim().await.unwrap().unwrap();
    let outcome = queue
        .fail(first.id, "connection reset", RetryDirective::Timed)
        .await
        .unwrap();
    assert!(matches!(outcome, FailureOutcome::Retrying { attempt: 1, .. }));

    let second = queue.claim().await.unwrap().unwrap();
    assert_eq!(second.attempt, 2);
    let outcome = queue
        .fail(second.id, "connection reset again", RetryDirective::Timed)
        .await
        .unwrap();

    assert_eq!(outcome, FailureOutcome::DeadLettered { attempts: 2 });
    assert!(queue.claim().await.unwrap().is_none());
    assert_eq!(queue.stats().await.unwrap().failed, 1);
    assert_eq!(
        queue.last_error(handle.id).await.unwrap().as_deref(),
        Some("connection reset again")
    );

    database.cleanup().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn no_retry_directive_dead_letters_immediately() {
    init_test_tracing();
    let database = spawn_database().await;
    let queue = PostgresJobQueue::new(database.pool.clone(), Duration::from_secs(60), no_backoff(5));
    queue.enqueue(MergeJob::new("conn-1")).await.unwrap();

    let claimed = queue.claim().await.unwrap().unwrap();
    let outcome = queue
        .fail(claimed.id, "missing staging table", RetryDirective::NoRetry)
        .await
        .unwrap();

    assert_eq!(outcome, FailureOutcome::DeadLettered { attempts: 1 });

    database.cleanup().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn expired_lease_is_redelivered() {
    init_test_tracing();
    let database = spawn_database().await;
    let queue = PostgresJobQueue::new(
        database.pool.clone(),
        Duration::from_millis(100),
        no_backoff(3),
    );
    queue.enqueue(MergeJob::new("conn-1")).await.unwrap();

    let abandoned = queue.claim().await.unwrap().unwrap();
    assert!(queue.claim().await.unwrap().is_none());
    tokio::time::sleep(Duration::from_millis(300)).await;

    let redelivered = queue.claim().await.unwrap().unwrap();
    assert_eq!(redelivered.id, abandoned.id);
    assert_eq!(redelivered.attempt, 2);

    database.cleanup().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn expired_lease_on_last_attempt_dead_letters_the_job() {
    init_test_tracing();
    let database = spawn_database().await;
    let queue = PostgresJobQueue::new(
        database.pool.clone(),
        Duration::from_millis(100),
        no_backoff(2),
    );
    let handle = queue.enqueue(MergeJob::new("conn-1")).await.unwrap();

    for attempt in 1..=2 {
        let claimed = queue.claim().await.unwrap().unwrap();
        assert_eq!(claimed.attempt, attempt);
        tokio::time::sleep(Duration::from_millis(300)).await;
    }

    assert!(queue.claim().await.unwrap().is_none());
    assert_eq!(
        queue.stats().await.unwrap(),
        QueueStats {
            failed: 1,
            ..Default::default()
        }
    );
    assert_eq!(
        queue.last_error(handle.id).await.unwrap().as_deref(),
        Some(LEASE_EXPIRED_ERROR)
    );

    database.cleanup().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_claims_never_share_a_job() {
    init_test_tracing();
    let database = spawn_database().await;
    let queue = PostgresJobQueue::new(database.pool.clone(), Duration::from_secs(60), no_backoff(3));
    for connection_id in ["a", "b", "c", "d", "e"] {
        queue.enqueue(MergeJob::new(connection_id)).await.unwrap();
    }

    let mut handles = Vec::new();
    for _ in 0..5 {
        let queue = queue.clone();
        handles.push(tokio::spawn(async move { queue.claim().await.unwrap() }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        if let Some(claimed) = handle.await.unwrap() {
            ids.push(claimed.id);
        }
    }
    ids.sort();
    ids.dedup();

    assert_eq!(ids.len(), 5);

    database.cleanup().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn completing_an_unknown_job_fails() {
    init_test_tracing();
    let database = spawn_database().await;
    let queue = PostgresJobQueue::new(database.pool.clone(), Duration::from_secs(60), no_backoff(3));

    let err = queue.complete(etl::queue::JobId(42)).await.unwrap_err();

    assert_eq!(err.kind(), etl::error::ErrorKind::JobNotFound);

    database.cleanup().await;
}
