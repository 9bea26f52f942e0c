//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments for the application using
//! the `clap` crate. These arguments are parsed at startup and merged over
//! the configuration from the `gateway.toml` file and environment variables.

use clap::Parser;
use figment::{
    providers::Serialized,
    value::{Dict, Map},
    Error, Figment, Metadata, Profile, Provider,
};
use std::net::SocketAddr;
use std::path::PathBuf;

/// An alert ingestion gateway that routes notifications to chat channels.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Address for the gateway HTTP listener.
    #[arg(long, value_name = "ADDR")]
    pub listen: Option<SocketAddr>,

    /// Logging level (trace, debug, info, warn, error).
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Deduplication window in milliseconds.
    #[arg(long, value_name = "MS")]
    pub dedupe_window_ms: Option<u64>,

    /// IANA timezone used when rendering timestamps.
    #[arg(long, value_name = "ZONE")]
    pub timezone: Option<String>,
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut figment = Figment::new();

        if let Some(listen) = self.listen {
            figment = figment.merge(Serialized::default("listen_address", listen));
        }
        if let Some(level) = &self.log_level {
            figment = figment.merge(Serialized::default("log_level", level));
        }
        if let Some(window) = self.dedupe_window_ms {
            figment = figment.merge(Serialized::default("deduplication.window_ms", window));
        }
        if let Some(zone) = &self.timezone {
            figment = figment.merge(Serialized::default("routing.timezone", zone));
        }

        figment.data()
    }
}
