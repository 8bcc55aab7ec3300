//! Postgres helpers shared by the services: connection pools, identifier quoting and
//! database lifecycle utilities for tests.

pub mod pool;
pub mod schema;
#[cfg(feature = "test-utils")]
pub mod test_utils;
