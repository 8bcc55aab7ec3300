//! Background workers executing merge jobs.

pub mod merge;
pub mod policy;
