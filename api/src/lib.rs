//! HTTP entry point receiving CRM sync-completion webhooks.

pub mod config;
pub mod request_logging;
pub mod routes;
pub mod startup;
