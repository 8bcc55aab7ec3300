//! Core value types shared by the aggregator, the dispatcher and the webhook.

mod event;

pub use event::*;
