#![allow(dead_code)]
//! Test helpers for running the full gateway instance.

use anyhow::Result;
use notify_gateway::{app::App, config::Config, core::Notifier, internal_metrics::Metrics};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;

pub const INGEST_TOKEN: &str = "test-ingest-token";
pub const WEBHOOK_TOKEN: &str = "test-webhook-token";

/// Represents a running instance of the gateway for testing purposes.
pub struct TestApp {
    pub addr: SocketAddr,
    pub shutdown_tx: watch::Sender<bool>,
    pub app_handle: Option<JoinHandle<Result<()>>>,
    pub client: reqwest::Client,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Shuts down the application and waits for it to terminate.
    /// Fails if the application does not shut down within the specified timeout.
    pub async fn shutdown(self, timeout_duration: Duration) -> Result<()> {
        self.shutdown_tx.send(true).ok();

        if let Some(handle) = self.app_handle {
            match timeout(timeout_duration, handle).await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => Err(e.into()),
                Err(_) => Err(anyhow::anyhow!("App failed to shut down within the timeout")),
            }
        } else {
            Ok(())
        }
    }
}

/// A builder for `TestApp` instances bound to an ephemeral port, with dummy
/// auth tokens and metrics disabled.
pub struct TestAppBuilder {
    pub config: Config,
    notifier: Option<Arc<dyn Notifier>>,
}

impl TestAppBuilder {
    pub fn new() -> Self {
        let mut config = Config::default();
        config.listen_address = ([127, 0, 0, 1], 0).into();
        config.auth.ingest_token = INGEST_TOKEN.to_string();
        config.auth.webhook_token = WEBHOOK_TOKEN.to_string();
        config.metrics.enabled = false;
        // A short schedule keeps failure-path tests fast.
        config.dispatch.retry_schedule_ms = vec![50];

        Self {
            config,
            notifier: None,
        }
    }

    /// Substitutes the delivery backend.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Applies an arbitrary configuration tweak before startup.
    pub fn with_config<F: FnOnce(&mut Config)>(mut self, mutate: F) -> Self {
        mutate(&mut self.config);
        self
    }

    pub async fn start(self) -> Result<TestApp> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut builder = App::builder(self.config).metrics_override(Metrics::new_for_test());
        if let Some(notifier) = self.notifier {
            builder = builder.notifier_override(notifier);
        }
        let app = builder.build(shutdown_rx).await?;
        let addr = app.listen_addr();
        let app_handle = tokio::spawn(app.run());

        Ok(TestApp {
            addr,
            shutdown_tx,
            app_handle: Some(app_handle),
            client: reqwest::Client::new(),
        })
    }
}

impl Default for TestAppBuilder {
    fn default() -> Self {
        Self::new()
    }
}
