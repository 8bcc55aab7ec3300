//! Logging and metrics setup shared by the service binaries and their tests.

pub mod metrics;
pub mod tracing;

pub use crate::tracing::{LogFlusher, init_test_tracing, init_tracing};
