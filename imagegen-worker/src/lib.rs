//! Generate an image for every prompt row inserted into the table, store it, and
//! record where it went.
pub mod app_context;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod metrics_consts;
pub mod notifier;
pub mod pipeline;
pub mod router;
