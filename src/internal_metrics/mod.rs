//! # Internal Metrics Module
//!
//! Prometheus metrics for the gateway.
//!
//! ## Components:
//!
//! - **`MetricsBuilder`**: The entry point for initializing the metrics
//!   system. It installs the Prometheus recorder, binds the scrape listener,
//!   and constructs the `Metrics` handle.
//!
//! - **`Metrics`**: A lightweight, cloneable struct that serves as the public
//!   API for the rest of the application. Labeled metrics are emitted via
//!   macros at their call sites; this struct carries handles for the
//!   unlabeled hot-path counters.
//!
//! - **`MetricsServer`**: (Defined in `server.rs`) An `axum`-based web server
//!   that exposes the `/metrics` endpoint for Prometheus to scrape.

use crate::config::MetricsConfig;
use crate::internal_metrics::server::MetricsServer;
use metrics::{Counter, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::error;

/// The public API for the metrics system.
#[derive(Clone)]
pub struct Metrics {
    pub alerts_received_total: Counter,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Metrics {
    /// Creates a new `Metrics` instance and registers descriptions for all
    /// supported metrics with the global recorder.
    pub fn new() -> Self {
        metrics::describe_counter!(
            "alerts_received_total",
            Unit::Count,
            "Total number of alerts accepted for dispatch across all ingest endpoints."
        );
        metrics::describe_counter!(
            "notifications_total",
            Unit::Count,
            "Total number of per-tag delivery outcomes, labeled by outcome (sent, skipped, failed)."
        );
        metrics::describe_counter!(
            "dedupe_suppressed_total",
            Unit::Count,
            "Total number of notifications suppressed by the deduplication window."
        );
        metrics::describe_gauge!(
            "dedupe_cache_entries",
            Unit::Count,
            "Current number of keys tracked by the deduplication cache."
        );
        metrics::describe_histogram!(
            "dispatch_duration_seconds",
            Unit::Seconds,
            "Wall-clock time to dispatch one alert batch, including retries."
        );

        Self {
            alerts_received_total: metrics::counter!("alerts_received_total"),
        }
    }

    /// Creates a `Metrics` instance that performs no operations.
    /// Used when metrics are disabled in the configuration.
    pub fn disabled() -> Self {
        Self {
            alerts_received_total: metrics::counter!("disabled"),
        }
    }

    /// Creates a `Metrics` instance suitable for testing.
    ///
    /// Without an installed recorder the `metrics` crate's default is a
    /// no-op, so tests can hand out handles freely.
    pub fn new_for_test() -> Self {
        Self::new()
    }
}

/// Builder for the metrics system.
///
/// Responsible for initializing the Prometheus recorder, binding the scrape
/// listener, and creating the `Metrics` handle.
pub struct MetricsBuilder {
    config: MetricsConfig,
}

impl MetricsBuilder {
    /// Creates a new `MetricsBuilder` with the given configuration.
    pub fn new(config: MetricsConfig) -> Self {
        Self { config }
    }

    /// Initializes the metrics system and returns a `Metrics` handle and an
    /// optional `MetricsServer`.
    ///
    /// If metrics are disabled in the configuration, or any part of the setup
    /// fails, this method returns a disabled `Metrics` instance and `None`
    /// for the server; the gateway runs fine without them.
    ///
    /// # Arguments
    ///
    /// * `shutdown_rx` - A watch channel receiver for graceful shutdown.
    pub fn build(
        self,
        shutdown_rx: watch::Receiver<bool>,
    ) -> (Metrics, Option<(MetricsServer, SocketAddr)>) {
        if !self.config.enabled {
            return (Metrics::disabled(), None);
        }

        let recorder = match PrometheusBuilder::new().set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
        ) {
            Ok(builder) => builder.build_recorder(),
            Err(e) => {
                error!("Failed to configure Prometheus histogram buckets: {}", e);
                return (Metrics::disabled(), None);
            }
        };
        let handle = recorder.handle();

        // Bind the listener before installing the recorder so a bad address
        // leaves the global recorder untouched.
        let listener = match std::net::TcpListener::bind(self.config.listen_address) {
            Ok(listener) => listener,
            Err(e) => {
                error!(
                    "Failed to bind metrics server to {}: {}",
                    self.config.listen_address, e
                );
                return (Metrics::disabled(), None);
            }
        };

        let addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                error!("Failed to get local address for metrics server: {}", e);
                return (Metrics::disabled(), None);
            }
        };

        // The listener must be non-blocking to be used with Tokio.
        if let Err(e) = listener.set_nonblocking(true) {
            error!("Failed to set metrics listener non-blocking: {}", e);
            return (Metrics::disabled(), None);
        }
        let listener = match TcpListener::from_std(listener) {
            Ok(listener) => listener,
            Err(e) => {
                error!("Failed to register metrics listener with the runtime: {}", e);
                return (Metrics::disabled(), None);
            }
        };

        if let Err(e) = metrics::set_global_recorder(recorder) {
            error!("Failed to install Prometheus recorder: {}", e);
            return (Metrics::disabled(), None);
        }

        let metrics = Metrics::new();
        let server = MetricsServer::new(listener, handle, shutdown_rx);

        (metrics, Some((server, addr)))
    }
}

pub mod server;
