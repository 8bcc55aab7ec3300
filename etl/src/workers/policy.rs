use crate::error::{ErrorKind, EtlError};

/// Retry behavior for a classified error.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RetryDirective {
    /// The job is retried by the queue with backoff until its attempts are exhausted.
    Timed,
    /// The job is dead-lettered at once.
    NoRetry,
}

/// How a failed merge job should be handled.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ErrorHandlingPolicy {
    retry_directive: RetryDirective,
    solution: Option<&'static str>,
}

impl ErrorHandlingPolicy {
    const fn new(retry_directive: RetryDirective, solution: Option<&'static str>) -> Self {
        Self {
            retry_directive,
            solution,
        }
    }

    pub fn retry_directive(&self) -> RetryDirective {
        self.retry_directive
    }

    /// Returns an operator-facing hint, if there is one.
    pub fn solution(&self) -> Option<&'static str> {
        self.solution
    }
}

/// Builds an [`ErrorHandlingPolicy`] from the kind of a merge error.
pub fn build_error_handling_policy(error: &EtlError) -> ErrorHandlingPolicy {
    match error.kind() {
        // Errors that never go away by running the same merge again.
        ErrorKind::StagingSchemaMismatch => ErrorHandlingPolicy::new(
            RetryDirective::NoRetry,
            Some("Verify the staging tables and columns match the merge plan."),
        ),
        ErrorKind::ConfigError => ErrorHandlingPolicy::new(
            RetryDirective::NoRetry,
            Some("Fix the merger configuration and enqueue the merge again."),
        ),
        ErrorKind::DeserializationError => ErrorHandlingPolicy::new(
            RetryDirective::NoRetry,
            Some("The job payload is malformed; inspect the dead-lettered job."),
        ),

        #[cfg(feature = "failpoints")]
        ErrorKind::FailPoint => ErrorHandlingPolicy::new(RetryDirective::Timed, None),

        // Connectivity, lock and data errors may clear up on a later attempt.
        ErrorKind::DatabaseConnectionFailed | ErrorKind::TransactionFailed => {
            ErrorHandlingPolicy::new(RetryDirective::Timed, None)
        }
        _ => ErrorHandlingPolicy::new(
            RetryDirective::Timed,
            Some("Inspect the last error of the job if retries keep failing."),
        ),
    }
}
