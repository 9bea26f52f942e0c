//! notify-gateway - Alert and Event Notification Gateway
//!
//! Receives alerts and simplified events over HTTP, routes them to
//! notification channels by severity and source, suppresses repeats within
//! a deduplication window, and delivers with bounded retries.

use anyhow::Result;
use clap::Parser;
use notify_gateway::app::App;
use notify_gateway::cli::Cli;
use notify_gateway::config::Config;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration by layering sources: defaults, file, environment, and CLI args.
    let config = match Config::load(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Failed to load configuration: {err}");
            std::process::exit(1);
        }
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("notify-gateway starting up...");

    // Log the loaded configuration settings for visibility
    info!("-------------------- Configuration --------------------");
    info!("Log Level: {}", config.log_level);
    info!("Listen Address: {}", config.listen_address);
    info!("Enabled Channels: {:?}", config.routing.enabled_channels);
    info!("Default Source: {}", config.routing.default_source);
    info!("Timezone: {}", config.routing.timezone);
    info!("Retry Schedule (ms): {:?}", config.dispatch.retry_schedule_ms);
    info!("Dedupe Window: {}ms", config.deduplication.window_ms);
    info!("Dedupe Capacity: {}", config.deduplication.max_entries);
    info!(
        "Webhook Targets: {}",
        config.channels.webhooks.len()
    );
    info!(
        "Metrics: {}",
        if config.metrics.enabled {
            "Enabled"
        } else {
            "Disabled"
        }
    );
    info!("-------------------------------------------------------");

    // =========================================================================
    // Create Shutdown Channel
    // =========================================================================
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let app = App::builder(config).build(shutdown_rx).await?;
    let run = tokio::spawn(app.run());

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Shutting down gracefully...");

    // Send shutdown signal to all tasks
    if shutdown_tx.send(true).is_err() {
        error!("Failed to send shutdown signal; tasks may already be gone.");
    }

    run.await??;
    info!("Exiting.");

    Ok(())
}
