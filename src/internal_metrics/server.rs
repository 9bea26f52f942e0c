//! # Metrics Server
//!
//! Defines the `MetricsServer`, an `axum`-based web server exposing the
//! collected metrics to a Prometheus scraper.
//!
//! The server provides a single endpoint, `/metrics`, which returns the
//! current state of all registered metrics in the Prometheus exposition
//! format. It listens for a shutdown signal from the main application and
//! terminates cleanly.

use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::future::Future;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, trace};

/// A server that exposes metrics to a Prometheus scraper.
pub struct MetricsServer {
    listener: TcpListener,
    prom_handle: PrometheusHandle,
    shutdown_rx: watch::Receiver<bool>,
}

impl MetricsServer {
    /// Creates a new `MetricsServer` but does not spawn it.
    ///
    /// # Arguments
    ///
    /// * `listener` - A `TcpListener` that has already been bound to an address.
    /// * `prom_handle` - A `PrometheusHandle` used to render the metrics.
    /// * `shutdown_rx` - A watch channel receiver for graceful shutdown.
    pub fn new(
        listener: TcpListener,
        prom_handle: PrometheusHandle,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            listener,
            prom_handle,
            shutdown_rx,
        }
    }

    /// Returns a future that runs the server until a shutdown signal is received.
    pub fn run(self) -> impl Future<Output = ()> {
        let Self {
            listener,
            prom_handle,
            mut shutdown_rx,
        } = self;
        let app =
            Router::new().route("/metrics", get(move || async move { prom_handle.render() }));

        async move {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    trace!("Metrics server received shutdown signal.");
                }
                result = axum::serve(listener, app.into_make_service()) => {
                    if let Err(e) = result {
                        // Expected during graceful shutdown when the server is dropped.
                        if !e.to_string().contains("operation was canceled") {
                            error!("Metrics server error: {}", e);
                        }
                    }
                }
            }
            trace!("Metrics server task finished.");
        }
    }
}
