//! Metric names and labels recorded by the aggregator, the queue and the merge engine.

/// Label holding an object kind.
pub const OBJECT_LABEL: &str = "object";

/// Label holding the outcome of an event or a job.
pub const OUTCOME_LABEL: &str = "outcome";

/// Label holding a destination table name.
pub const TABLE_LABEL: &str = "table";

/// Label holding an error kind.
pub const ERROR_KIND_LABEL: &str = "error_kind";

/// Counter of sync events received, labelled by object and outcome.
pub const SYNC_EVENTS_TOTAL: &str = "sync_events_total";

/// Counter of merge jobs dispatched after a completed sync cycle.
pub const MERGE_DISPATCHES_TOTAL: &str = "merge_dispatches_total";

/// Counter of dispatches whose enqueue failed and whose progress was restored.
pub const MERGE_ENQUEUE_FAILURES_TOTAL: &str = "merge_enqueue_failures_total";

/// Counter of merge runs, labelled by outcome.
pub const MERGE_RUNS_TOTAL: &str = "merge_runs_total";

/// Histogram of merge transaction durations in seconds.
pub const MERGE_DURATION_SECONDS: &str = "merge_duration_seconds";

/// Counter of destination rows inserted or updated, labelled by table.
pub const MERGE_ROWS_UPSERTED_TOTAL: &str = "merge_rows_upserted_total";

/// Counter of failed jobs rescheduled for another attempt.
pub const MERGE_JOBS_RETRIED_TOTAL: &str = "merge_jobs_retried_total";

/// Counter of jobs moved to the dead-letter state.
pub const MERGE_JOBS_DEAD_LETTERED_TOTAL: &str = "merge_jobs_dead_lettered_total";
