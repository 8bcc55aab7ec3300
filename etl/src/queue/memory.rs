use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::counter;
use tokio::sync::Mutex;
use tracing::warn;

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::metrics::MERGE_JOBS_DEAD_LETTERED_TOTAL;
use crate::queue::base::{
    ClaimedJob, FailureOutcome, JobHandle, JobId, JobQueue, JobStatus, LEASE_EXPIRED_ERROR,
    MergeJob, QueueStats,
};
use crate::queue::retry::RetryPolicy;
use crate::workers::policy::RetryDirective;

#[derive(Debug)]
struct StoredJob {
    job: MergeJob,
    status: JobStatus,
    attempts: u32,
    available_at: Instant,
    lease_expires_at: Option<Instant>,
    last_error: Option<String>,
}

impl StoredJob {
    fn lease_expired(&self, now: Instant) -> bool {
        self.status == JobStatus::Running && self.lease_expires_at.is_some_and(|lease| lease <= now)
    }

    fn is_claimable(&self, now: Instant, max_attempts: u32) -> bool {
        match self.status {
            JobStatus::Pending => self.available_at <= now,
            JobStatus::Running => self.lease_expired(now) && self.attempts < max_attempts,
            JobStatus::Completed | JobStatus::Failed => false,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    jobs: BTreeMap<JobId, StoredJob>,
}

/// In-process job queue with the same delivery rules as [`crate::queue::PostgresJobQueue`].
///
/// Jobs do not survive a restart.
#[derive(Debug, Clone)]
pub struct MemoryJobQueue {
    inner: Arc<Mutex<Inner>>,
    lease_duration: Duration,
    retry_policy: RetryPolicy,
}

impl MemoryJobQueue {
    pub fn new(lease_duration: Duration, retry_policy: RetryPolicy) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            lease_duration,
            retry_policy,
        }
    }

    /// Returns the last error recorded for a job.
    pub async fn last_error(&self, id: JobId) -> Option<String> {
        let inner = self.inner.lock().await;

        inner.jobs.get(&id).and_then(|job| job.last_error.clone())
    }
}

impl Default for MemoryJobQueue {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(config::shared::QueueConfig::DEFAULT_LEASE_DURATION_MS),
            RetryPolicy::default(),
        )
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, job: MergeJob) -> EtlResult<JobHandle> {
        let mut inner = self.inner.lock().await;

        inner.next_id += 1;
        let id = JobId(inner.next_id);
        inner.jobs.insert(
            id,
            StoredJob {
                job,
                status: JobStatus::Pending,
                attempts: 0,
                available_at: Instant::now(),
                lease_expires_at: None,
                last_error: None,
            },
        );

        Ok(JobHandle { id })
    }

    async fn claim(&self) -> EtlResult<Option<ClaimedJob>> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        let max_attempts = self.retry_policy.max_attempts();

        for (id, stored) in inner.jobs.iter_mut() {
            if stored.lease_expired(now) && stored.attempts >= max_attempts {
                warn!(
                    job_id = %id,
                    attempts = stored.attempts,
                    "dead-lettering merge job whose last lease expired"
                );
                stored.status = JobStatus::Failed;
                stored.lease_expires_at = None;
                stored.last_error = Some(LEASE_EXPIRED_ERROR.to_string());
                counter!(MERGE_JOBS_DEAD_LETTERED_TOTAL).increment(1);
            }
        }

        let Some((id, stored)) = inner
            .jobs
            .iter_mut()
            .find(|(_, stored)| stored.is_claimable(now, max_attempts))
        else {
            return Ok(None);
        };

        stored.status = JobStatus::Running;
        stored.attempts += 1;
        stored.lease_expires_at = Some(now + self.lease_duration);

        Ok(Some(ClaimedJob {
            id: *id,
            job: stored.job.clone(),
            attempt: stored.attempts,
        }))
    }

    async fn complete(&self, id: JobId) -> EtlResult<()> {
        let mut inner = self.inner.lock().await;

        let Some(stored) = inner
            .jobs
            .get_mut(&id)
            .filter(|stored| stored.status == JobStatus::Running)
        else {
            bail!(ErrorKind::JobNotFound, "No running job with this id", id);
        };

        stored.status = JobStatus::Completed;
        stored.lease_expires_at = None;

        Ok(())
    }

    async fn fail(
        &self,
        id: JobId,
        error: &str,
        directive: RetryDirective,
    ) -> EtlResult<FailureOutcome> {
        let mut inner = self.inner.lock().await;

        let Some(stored) = inner
            .jobs
            .get_mut(&id)
            .filter(|stored| stored.status == JobStatus::Running)
        else {
            bail!(ErrorKind::JobNotFound, "No running job with this id", id);
        };

        stored.last_error = Some(error.to_string());
        stored.lease_expires_at = None;

        if directive == RetryDirective::Timed && self.retry_policy.should_retry(stored.attempts) {
            let delay = self.retry_policy.backoff_for(stored.attempts);
            stored.status = JobStatus::Pending;
            stored.available_at = Instant::now() + delay;

            return Ok(FailureOutcome::Retrying {
                attempt: stored.attempts,
                delay,
            });
        }

        stored.status = JobStatus::Failed;

        Ok(FailureOutcome::DeadLettered {
            attempts: stored.attempts,
        })
    }

    async fn stats(&self) -> EtlResult<QueueStats> {
        let inner = self.inner.lock().await;

        let mut stats = QueueStats::default();
        for stored in inner.jobs.values() {
            stats.add(stored.status, 1);
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(lease: Duration, max_attempts: u32) -> MemoryJobQueue {
        MemoryJobQueue::new(
            lease,
            RetryPolicy::new(max_attempts, Duration::ZERO, Duration::ZERO, 0),
        )
    }

    #[tokio::test]
    async fn claimed_job_is_not_delivered_twice_while_leased() {
        let queue = queue(Duration::from_secs(60), 3);
        let handle = queue.enqueue(MergeJob::new("conn")).await.unwrap();

        let claimed = queue.claim().await.unwrap().unwrap();

        assert_eq!(claimed.id, handle.id);
        assert_eq!(claimed.job.connection_id, "conn");
        assert_eq!(claimed.attempt, 1);
        assert!(queue.claim().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn completed_job_is_counted() {
        let queue = queue(Duration::from_secs(60), 3);
        queue.enqueue(MergeJob::new("conn")).await.unwrap();

        let claimed = queue.claim().await.unwrap().unwrap();
        queue.complete(claimed.id).await.unwrap();

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.pending + stats.running + stats.failed, 0);
        assert!(queue.complete(claimed.id).await.is_err());
    }

    #[tokio::test]
    async fn failed_job_is_retried_then_dead_lettered() {
        let queue = queue(Duration::from_secs(60), 2);
        queue.enqueue(MergeJob::new("conn")).await.unwrap();

        let first = queue.claim().await.unwrap().unwrap();
        let outcome = queue
            .fail(first.id, "connection refused", RetryDirective::Timed)
            .await
            .unwrap();
        assert!(matches!(outcome, FailureOutcome::Retrying { attempt: 1, .. }));

        let second = queue.claim().await.unwrap().unwrap();
        assert_eq!(second.attempt, 2);
        let outcome = queue
            .fail(second.id, "connection refused again", RetryDirective::Timed)
            .await
            .unwrap();
        assert_eq!(outcome, FailureOutcome::DeadLettered { attempts: 2 });

        assert!(queue.claim().await.unwrap().is_none());
        assert_eq!(queue.stats().await.unwrap().failed, 1);
        assert_eq!(
            queue.last_error(second.id).await.as_deref(),
            Some("connection refused again")
        );
    }

    #[tokio::test]
    async fn no_retry_directive_dead_letters_immediately() {
        let queue = queue(Duration::from_secs(60), 5);
        queue.enqueue(MergeJob::new("conn")).await.unwrap();

        let claimed = queue.claim().await.unwrap().unwrap();
        let outcome = queue
            .fail(claimed.id, "missing staging table", RetryDirective::NoRetry)
            .await
            .unwrap();

        assert_eq!(outcome, FailureOutcome::DeadLettered { attempts: 1 });
    }

    #[tokio::test]
    async fn expired_lease_is_redelivered() {
        let queue = queue(Duration::from_millis(20), 3);
        queue.enqueue(MergeJob::new("conn")).await.unwrap();

        let first = queue.claim().await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = queue.claim().await.unwrap().unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.attempt, 2);
    }

    #[tokio::test]
    async fn expired_lease_on_last_attempt_dead_letters_the_job() {
        let queue = queue(Duration::from_millis(1), 2);
        let handle = queue.enqueue(MergeJob::new("conn")).await.unwrap();

        for attempt in 1..=2 {
            let claimed = queue.claim().await.unwrap().unwrap();
            assert_eq!(claimed.attempt, attempt);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(queue.claim().await.unwrap().is_none());
        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.running, 0);
        assert_eq!(
            queue.last_error(handle.id).await.as_deref(),
            Some(LEASE_EXPIRED_ERROR)
        );
    }

    #[tokio::test]
    async fn jobs_are_claimed_in_enqueue_order() {
        let queue = queue(Duration::from_secs(60), 3);
        let first = queue.enqueue(MergeJob::new("a")).await.unwrap();
        let second = queue.enqueue(MergeJob::new("b")).await.unwrap();

        assert_eq!(queue.claim().await.unwrap().unwrap().id, first.id);
        assert_eq!(queue.claim().await.unwrap().unwrap().id, second.id);
    }
}
