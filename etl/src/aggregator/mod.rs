//! Tracks which object kinds synced per connection and decides when to dispatch a merge.

mod base;
mod core;
mod memory;
mod postgres;

pub use base::{ProgressStore, RecordOutcome};
pub use self::core::EventAggregator;
pub use memory::MemoryProgressStore;
pub use postgres::PostgresProgressStore;
