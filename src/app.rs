//! The main application logic, decoupled from the entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::core::Notifier;
use crate::deduplication::DedupeCache;
use crate::dispatch::Dispatcher;
use crate::internal_metrics::{Metrics, MetricsBuilder};
use crate::notification::TaggedNotifier;
use crate::routing::RoutingTable;
use crate::server::{self, GatewayState};
use crate::task_manager::TaskManager;

/// A handle to the running application, containing all its task handles.
pub struct App {
    task_manager: TaskManager,
    listen_addr: SocketAddr,
    metrics_addr: Option<SocketAddr>,
    shutdown_rx: watch::Receiver<bool>,
}

impl App {
    /// Creates a new `AppBuilder` to construct an `App`.
    pub fn builder(config: Config) -> AppBuilder {
        AppBuilder::new(config)
    }

    /// Address the gateway API is actually bound to.
    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    /// Address of the metrics scrape endpoint, when enabled.
    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics_addr
    }

    /// Waits for the shutdown signal and then gracefully shuts down all tasks.
    pub async fn run(self) -> Result<()> {
        let mut shutdown_rx = self.shutdown_rx;
        shutdown_rx.changed().await.ok();
        info!("Shutdown signal received. Waiting for tasks to complete...");

        self.task_manager.shutdown().await;

        info!("All tasks shut down.");
        Ok(())
    }
}

/// Builder for the main application.
///
/// This pattern allows for a clean separation of concerns between constructing
/// the application's components and running the application. It also provides
/// a convenient way to override components for testing purposes.
pub struct AppBuilder {
    config: Config,
    notifier_override: Option<Arc<dyn Notifier>>,
    metrics_override: Option<Metrics>,
}

impl AppBuilder {
    /// Creates a new `AppBuilder` with the given configuration.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            notifier_override: None,
            metrics_override: None,
        }
    }

    /// Overrides the delivery backend for testing.
    pub fn notifier_override(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier_override = Some(notifier);
        self
    }

    /// Overrides the metrics system for testing.
    pub fn metrics_override(mut self, metrics: Metrics) -> Self {
        self.metrics_override = Some(metrics);
        self
    }

    /// Builds and initializes all application components, returning a runnable `App`.
    pub async fn build(self, shutdown_rx: watch::Receiver<bool>) -> Result<App> {
        let config = self.config;
        config.validate()?;
        let routing = Arc::new(RoutingTable::from_config(&config)?);
        let mut task_manager = TaskManager::new();

        // =========================================================================
        // 1. Initialize Metrics
        // =========================================================================
        let (metrics, metrics_server_info) = match self.metrics_override {
            Some(metrics) => (metrics, None),
            None => MetricsBuilder::new(config.metrics.clone()).build(shutdown_rx.clone()),
        };

        let metrics_addr = if let Some((metrics_server, addr)) = metrics_server_info {
            task_manager.spawn("MetricsServer", metrics_server.run());
            info!("Metrics server listening on {}", addr);
            Some(addr)
        } else {
            None
        };

        // =========================================================================
        // 2. Delivery Backend
        // =========================================================================
        let notifier: Arc<dyn Notifier> = match self.notifier_override {
            Some(notifier) => notifier,
            None => {
                let notifier = TaggedNotifier::from_config(&config.channels, &routing)?;
                if notifier.target_count() == 0 {
                    warn!("no notification targets configured; every delivery will be skipped");
                }
                Arc::new(notifier)
            }
        };

        // =========================================================================
        // 3. Dispatch Pipeline
        // =========================================================================
        let dedupe = Arc::new(DedupeCache::new(
            routing.dedupe_window_ms(),
            routing.dedupe_max_entries(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&routing), dedupe, notifier));

        // =========================================================================
        // 4. Gateway API Server
        // =========================================================================
        let state = Arc::new(GatewayState {
            routing: Arc::clone(&routing),
            dispatcher,
            ingest_token: config.auth.ingest_token.trim().to_string(),
            webhook_token: config.auth.webhook_token.trim().to_string(),
            metrics,
        });
        let router = server::router(state);
        let listener = TcpListener::bind(config.listen_address)
            .await
            .with_context(|| format!("failed to bind gateway to {}", config.listen_address))?;
        let listen_addr = listener
            .local_addr()
            .context("gateway listener has no local address")?;
        info!("Gateway listening on {}", listen_addr);

        let mut server_shutdown_rx = shutdown_rx.clone();
        task_manager.spawn("GatewayServer", async move {
            tokio::select! {
                biased;
                _ = server_shutdown_rx.changed() => {
                    info!("Gateway server received shutdown signal.");
                }
                result = axum::serve(listener, router.into_make_service()) => {
                    if let Err(e) = result {
                        error!("Gateway server error: {}", e);
                    }
                }
            }
        });

        Ok(App {
            task_manager,
            listen_addr,
            metrics_addr,
            shutdown_rx,
        })
    }
}
