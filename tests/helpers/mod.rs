#![allow(dead_code)]
//! Shared helpers for the integration tests.

pub mod app;

use std::time::Duration;

/// Polls `condition` every 10ms until it holds or `limit` elapses.
/// Returns the final evaluation, so callers can assert on it.
pub async fn wait_until<F: Fn() -> bool>(limit: Duration, condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
