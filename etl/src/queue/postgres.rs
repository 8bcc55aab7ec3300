use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use sqlx::PgPool;
use sqlx::types::Json;
use tracing::{debug, warn};

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::metrics::MERGE_JOBS_DEAD_LETTERED_TOTAL;
use crate::queue::base::{
    ClaimedJob, FailureOutcome, JobHandle, JobId, JobQueue, JobStatus, LEASE_EXPIRED_ERROR,
    MERGE_JOB_KIND, MergeJob, QueueStats,
};
use crate::queue::retry::RetryPolicy;
use crate::workers::policy::RetryDirective;

/// Dead-letters running jobs whose lease expired on their last allowed attempt.
const EXPIRE_EXHAUSTED_QUERY: &str = r#"
    update etl.merge_jobs
    set status = 'failed',
        lease_expires_at = null,
        last_error = $3,
        updated_at = now()
    where kind = $1
      and status = 'running'
      and lease_expires_at <= now()
      and attempts >= $2
"#;

/// Leases the oldest claimable job: pending and due, or running with an expired lease and
/// attempts left.
///
/// `skip locked` lets concurrent workers claim different jobs without blocking each other.
const CLAIM_QUERY: &str = r#"
    update etl.merge_jobs
    set status = 'running',
        attempts = attempts + 1,
        lease_expires_at = now() + make_interval(secs => $2),
        updated_at = now()
    where id = (
        select id
        from etl.merge_jobs
        where kind = $1
          and (
            (status = 'pending' and available_at <= now())
            or (status = 'running' and lease_expires_at <= now() and attempts < $3)
          )
        order by available_at, id
        limit 1
        for update skip locked
    )
    returning id, payload, attempts
"#;

/// Job queue stored in the `etl.merge_jobs` table.
#[derive(Debug, Clone)]
pub struct PostgresJobQueue {
    pool: PgPool,
    lease_duration: Duration,
    retry_policy: RetryPolicy,
}

impl PostgresJobQueue {
    pub fn new(pool: PgPool, lease_duration: Duration, retry_policy: RetryPolicy) -> Self {
        Self {
            pool,
            lease_duration,
            retry_policy,
        }
    }

    /// Returns the last error recorded for a job.
    pub async fn last_error(&self, id: JobId) -> EtlResult<Option<String>> {
        let last_error: Option<Option<String>> =
            sqlx::query_scalar("select last_error from etl.merge_jobs where id = $1")
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await?;

        Ok(last_error.flatten())
    }
}

#[async_trait]
impl JobQueue for PostgresJobQueue {
    async fn enqueue(&self, job: MergeJob) -> EtlResult<JobHandle> {
        let id: i64 = sqlx::query_scalar(
            r#"
            insert into etl.merge_jobs (kind, payload)
            values ($1, $2)
            returning id
            "#,
        )
        .bind(MERGE_JOB_KIND)
        .bind(Json(&job))
        .fetch_one(&self.pool)
        .await?;

        debug!(job_id = id, connection_id = %job.connection_id, "enqueued merge job");

        Ok(JobHandle { id: JobId(id) })
    }

    async fn claim(&self) -> EtlResult<Option<ClaimedJob>> {
        let max_attempts = i32::try_from(self.retry_policy.max_attempts()).unwrap_or(i32::MAX);

        let expired = sqlx::query(EXPIRE_EXHAUSTED_QUERY)
            .bind(MERGE_JOB_KIND)
            .bind(max_attempts)
            .bind(LEASE_EXPIRED_ERROR)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if expired > 0 {
            warn!(jobs = expired, "dead-lettered merge jobs whose last lease expired");
            counter!(MERGE_JOBS_DEAD_LETTERED_TOTAL).increment(expired);
        }

        let row: Option<(i64, Json<MergeJob>, i32)> = sqlx::query_as(CLAIM_QUERY)
            .bind(MERGE_JOB_KIND)
            .bind(self.lease_duration.as_secs_f64())
            .bind(max_attempts)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(id, Json(job), attempts)| ClaimedJob {
            id: JobId(id),
            job,
            attempt: attempts.max(0) as u32,
        }))
    }

    async fn complete(&self, id: JobId) -> EtlResult<()> {
        let result = sqlx::query(
            r#"
            update etl.merge_jobs
            set status = 'completed', lease_expires_at = null, updated_at = now()
            where id = $1 and status = 'running'
            "#,
        )
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            bail!(ErrorKind::JobNotFound, "No running job with this id", id);
        }

        Ok(())
    }

    async fn fail(
        &self,
        id: JobId,
        error: &str,
        directive: RetryDirective,
    ) -> EtlResult<FailureOutcome> {
        let mut tx = self.pool.begin().await?;

        let attempts: Option<i32> = sqlx::query_scalar(
            "select attempts from etl.merge_jobs where id = $1 and status = 'running' for update",
        )
        .bind(id.0)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(attempts) = attempts else {
            bail!(ErrorKind::JobNotFound, "No running job with this id", id);
        };
        let attempts = attempts.max(0) as u32;

        let outcome =
            if directive == RetryDirective::Timed && self.retry_policy.should_retry(attempts) {
                let delay = self.retry_policy.backoff_for(attempts);
                sqlx::query(
                    r#"
                    update etl.merge_jobs
                    set status = 'pending',
                        available_at = now() + make_interval(secs => $2),
                        lease_expires_at = null,
                        last_error = $3,
                        updated_at = now()
                    where id = $1
                    "#,
                )
                .bind(id.0)
                .bind(delay.as_secs_f64())
                .bind(error)
                .execute(&mut *tx)
                .await?;

                FailureOutcome::Retrying {
                    attempt: attempts,
                    delay,
                }
            } else {
                sqlx::query(
                    r#"
                    update etl.merge_jobs
                    set status = 'failed',
                        lease_expires_at = null,
                        last_error = $2,
                        updated_at = now()
                    where id = $1
                    "#,
                )
                .bind(id.0)
                .bind(error)
                .execute(&mut *tx)
                .await?;

                FailureOutcome::DeadLettered { attempts }
            };

        tx.commit().await?;

        Ok(outcome)
    }

    async fn stats(&self) -> EtlResult<QueueStats> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "select status, count(*) from etl.merge_jobs where kind = $1 group by status",
        )
        .bind(MERGE_JOB_KIND)
        .fetch_all(&self.pool)
        .await?;

        let mut stats = QueueStats::default();
        for (status, count) in rows {
            let status = match status.as_str() {
                "pending" => JobStatus::Pending,
                "running" => JobStatus::Running,
                "completed" => JobStatus::Completed,
                "failed" => JobStatus::Failed,
                other => {
                    warn!(status = other, "ignoring unknown merge job status");
                    continue;
                }
            };
            stats.add(status, count.max(0) as u64);
        }

        Ok(stats)
    }
}
