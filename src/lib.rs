//! notify-gateway - An alert and event notification gateway
//!
//! This library receives alert batches and simplified events, resolves each
//! alert to a set of delivery tags, suppresses repeats within a time window,
//! renders a message, and delivers it to the configured channels with
//! bounded retries.

pub mod app;
pub mod cli;
pub mod config;
pub mod core;
pub mod deduplication;
pub mod dispatch;
pub mod ingest;
pub mod internal_metrics;
pub mod message;
pub mod notification;
pub mod routing;
pub mod server;
pub mod task_manager;

// Re-export core types for convenience
pub use self::core::*;
