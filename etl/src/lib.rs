//! Turns CRM sync-completion events into merges of staging data into destination tables.
//!
//! The pieces, in the order an event flows through them:
//!
//! - [`aggregator::EventAggregator`] tracks which object kinds synced per connection and
//!   decides when every required kind completed.
//! - [`dispatch::MergeDispatcher`] enqueues a [`queue::MergeJob`] for each completed cycle.
//! - [`queue::JobQueue`] stores jobs durably and delivers them at least once, with retries
//!   and a dead-letter state.
//! - [`workers::merge::MergeWorkerPool`] claims jobs and runs the [`merge::MergeEngine`],
//!   which upserts all staging rows in one transaction.

pub mod aggregator;
pub mod concurrency;
pub mod dispatch;
pub mod error;
#[cfg(feature = "failpoints")]
pub mod failpoints;
mod macros;
pub mod merge;
pub mod metrics;
pub mod migrations;
pub mod queue;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
pub mod workers;
