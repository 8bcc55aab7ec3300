//! Helpers shared by unit and integration tests.

pub mod database;
pub mod queue;
pub mod staging;
