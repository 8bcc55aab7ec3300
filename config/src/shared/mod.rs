//! Configuration types shared by the API and the merger.

mod base;
mod connection;
mod merge;
mod progress;
mod queue;
mod sentry;
mod worker;

pub use base::ValidationError;
pub use connection::*;
pub use merge::MergeConfig;
pub use progress::ProgressStoreConfig;
pub use queue::{QueueConfig, RetryConfig};
pub use sentry::SentryConfig;
pub use worker::WorkerConfig;
