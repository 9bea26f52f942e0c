//! Configuration management for the notification gateway.
//!
//! This module defines the main `Config` struct and its sub-structs,
//! responsible for holding all application settings. It uses the `figment`
//! crate to layer defaults, a `gateway.toml` file, environment variables
//! prefixed with `NOTIFY_` (nested keys separated by `__`, for example
//! `NOTIFY_DEDUPLICATION__WINDOW_MS=60000`), and command-line arguments,
//! in that order of increasing precedence.

use std::collections::HashMap;
use std::net::SocketAddr;

use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cli::Cli;
use crate::core::{Channel, Severity};

/// File consulted when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "gateway.toml";

/// Configuration problems that must stop startup before the gateway binds
/// its listener.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is required")]
    MissingToken(&'static str),
    #[error("routing.timezone is invalid: {0}")]
    InvalidTimezone(String),
    #[error("dispatch.retry_schedule_ms entries must be positive")]
    InvalidRetrySchedule,
    #[error("deduplication.window_ms must be positive")]
    InvalidDedupeWindow,
    #[error("deduplication.max_entries must be positive")]
    InvalidDedupeCapacity,
}

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// The logging level for the application.
    pub log_level: String,
    /// Address the gateway HTTP listener binds to.
    pub listen_address: SocketAddr,
    /// Bearer tokens protecting the ingest and webhook endpoints.
    pub auth: AuthConfig,
    /// Routing rules mapping alerts to delivery tags.
    pub routing: RoutingConfig,
    /// Retry behavior for failed deliveries.
    pub dispatch: DispatchConfig,
    /// Suppression of repeat notifications.
    pub deduplication: DeduplicationConfig,
    /// Credentials and endpoints for notification channels.
    pub channels: ChannelsConfig,
    /// Prometheus metrics exporter.
    pub metrics: MetricsConfig,
}

/// Bearer tokens for the two authenticated API surfaces.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AuthConfig {
    /// Token required on the ingest endpoints.
    #[serde(default)]
    pub ingest_token: String,
    /// Token required on the Alertmanager-compatible webhook endpoint.
    #[serde(default)]
    pub webhook_token: String,
}

/// Routing rules mapping alerts to delivery tags.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RoutingConfig {
    /// Channels that may receive notifications. Routes referencing other
    /// channels are silently filtered.
    pub enabled_channels: Vec<Channel>,
    /// Source attached to alerts that do not carry one.
    pub default_source: String,
    /// IANA timezone used when rendering timestamps.
    pub timezone: String,
    /// Destination channels per severity.
    pub route_by_severity: HashMap<Severity, Vec<Channel>>,
    /// Delivery tags each channel expands to. Channels not listed map to a
    /// tag equal to their own name.
    #[serde(default)]
    pub channel_tags: HashMap<Channel, Vec<String>>,
    /// Per-source tag routes keyed by lowercase source, then severity.
    /// These bypass channel routing entirely.
    #[serde(default)]
    pub source_routes: HashMap<String, HashMap<Severity, Vec<String>>>,
}

/// Retry behavior for failed deliveries.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DispatchConfig {
    /// Waits between delivery attempts, in milliseconds. An alert gets
    /// `len + 1` attempts. An empty schedule means a single attempt.
    pub retry_schedule_ms: Vec<u64>,
}

/// Suppression of repeat notifications.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DeduplicationConfig {
    /// Suppression window in milliseconds.
    pub window_ms: u64,
    /// Hard cap on tracked deduplication keys.
    pub max_entries: usize,
}

/// Credentials and endpoints for notification channels. A channel without
/// valid settings simply registers no destinations.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ChannelsConfig {
    pub telegram: Option<TelegramConfig>,
    pub wecom: Option<WecomConfig>,
    pub serverchan: Option<ServerchanConfig>,
    /// Additional generic webhook destinations with their own tags.
    #[serde(default)]
    pub webhooks: Vec<WebhookTarget>,
}

/// Telegram bot credentials.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

/// WeCom group robot endpoint.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WecomConfig {
    pub webhook_url: String,
}

/// ServerChan push credentials.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerchanConfig {
    pub send_key: String,
}

/// A generic JSON webhook destination.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WebhookTarget {
    pub url: String,
    /// Delivery tags this webhook subscribes to.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Prometheus metrics exporter settings.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MetricsConfig {
    /// Whether to expose the `/metrics` endpoint.
    pub enabled: bool,
    /// Address the metrics listener binds to.
    pub listen_address: SocketAddr,
}

impl Config {
    /// Loads the application configuration, layering defaults, the TOML
    /// file, `NOTIFY_*` environment variables, and CLI arguments.
    ///
    /// A `--config` path that does not exist is an error; the implicit
    /// default file is optional.
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        figment = match &cli.config {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Config file not found at specified path: {}", path.display());
                }
                figment.merge(Toml::file(path))
            }
            None => figment.merge(Toml::file(DEFAULT_CONFIG_FILE)),
        };

        let config = figment
            .merge(Env::prefixed("NOTIFY_").split("__"))
            .merge(cli.clone())
            .extract()?;
        Ok(config)
    }

    /// Checks the invariants that do not fit in the type system. Called once
    /// at startup; failures are fatal.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.ingest_token.trim().is_empty() {
            return Err(ConfigError::MissingToken("auth.ingest_token"));
        }
        if self.auth.webhook_token.trim().is_empty() {
            return Err(ConfigError::MissingToken("auth.webhook_token"));
        }
        Ok(())
    }
}

// Provide a default implementation for tests and easy setup.
impl Default for Config {
    fn default() -> Self {
        let all_channels = vec![Channel::Tg, Channel::Wecom, Channel::Serverchan];
        let default_route = vec![Channel::Tg, Channel::Wecom];
        Self {
            log_level: "info".to_string(),
            listen_address: SocketAddr::from(([0, 0, 0, 0], 8080)),
            auth: AuthConfig::default(),
            routing: RoutingConfig {
                enabled_channels: all_channels,
                default_source: "notify-gateway".to_string(),
                timezone: "UTC".to_string(),
                route_by_severity: HashMap::from([
                    (Severity::Critical, default_route.clone()),
                    (Severity::Warning, default_route.clone()),
                    (Severity::Info, default_route),
                ]),
                channel_tags: HashMap::new(),
                source_routes: HashMap::new(),
            },
            dispatch: DispatchConfig {
                retry_schedule_ms: vec![1000, 2000, 4000],
            },
            deduplication: DeduplicationConfig {
                window_ms: 45_000,
                max_entries: 10_000,
            },
            channels: ChannelsConfig::default(),
            metrics: MetricsConfig {
                enabled: false,
                listen_address: SocketAddr::from(([127, 0, 0, 1], 9090)),
            },
        }
    }
}
