//! Durable at-least-once delivery of merge jobs from the dispatcher to the merge workers.

mod base;
mod memory;
mod postgres;
mod retry;

pub use base::*;
pub use memory::MemoryJobQueue;
pub use postgres::PostgresJobQueue;
pub use retry::RetryPolicy;
