//! Coordination primitives for the worker loops.

pub mod shutdown;
