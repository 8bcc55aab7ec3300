//! Service running merge workers against the job queue.

pub mod config;
pub mod core;
