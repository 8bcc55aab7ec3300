use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EtlResult;
use crate::workers::policy::RetryDirective;

/// Job kind under which merge jobs are stored.
pub const MERGE_JOB_KIND: &str = "merge";

/// Error stored on a job whose last lease expired with no attempts left.
pub const LEASE_EXPIRED_ERROR: &str = "lease expired on the last allowed attempt";

/// Payload of a merge job.
///
/// The merge itself covers all staging data; the connection is kept for logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeJob {
    pub connection_id: String,
}

impl MergeJob {
    pub fn new(connection_id: impl Into<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
        }
    }
}

/// Identifier assigned to a job by the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(pub i64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Returned by [`JobQueue::enqueue`]. Enqueueing never waits for the job to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobHandle {
    pub id: JobId,
}

/// A job leased to one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedJob {
    pub id: JobId,
    pub job: MergeJob,
    /// Number of deliveries including this one.
    pub attempt: u32,
}

/// What the queue did with a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// The job becomes claimable again after `delay`.
    Retrying { attempt: u32, delay: Duration },
    /// The job will not be delivered again.
    DeadLettered { attempts: u32 },
}

/// Lifecycle state of a stored job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

/// Number of jobs per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
}

impl QueueStats {
    pub(crate) fn add(&mut self, status: JobStatus, count: u64) {
        match status {
            JobStatus::Pending => self.pending += count,
            JobStatus::Running => self.running += count,
            JobStatus::Completed => self.completed += count,
            JobStatus::Failed => self.failed += count,
        }
    }
}

/// Queue of merge jobs with lease based at-least-once delivery.
///
/// A claimed job is invisible to other workers until its lease expires. Workers report
/// the outcome with [`JobQueue::complete`] or [`JobQueue::fail`]; a job whose lease expires
/// without either is delivered again.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: MergeJob) -> EtlResult<JobHandle>;

    /// Leases the oldest claimable job, if any.
    async fn claim(&self) -> EtlResult<Option<ClaimedJob>>;

    async fn complete(&self, id: JobId) -> EtlResult<()>;

    /// Records a failed attempt and either schedules a retry or dead-letters the job.
    async fn fail(
        &self,
        id: JobId,
        error: &str,
        directive: RetryDirective,
    ) -> EtlResult<FailureOutcome>;

    async fn stats(&self) -> EtlResult<QueueStats>;
}
