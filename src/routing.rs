//! Routing rules that decide which delivery tags an alert fans out to.
//!
//! All routing state is compiled once at startup into an immutable
//! [`RoutingTable`] and passed by reference into every component that needs
//! it. Nothing here mutates after construction.

use std::collections::{HashMap, HashSet};

use chrono_tz::Tz;
use serde_json::Value;
use tracing::debug;

use crate::config::{Config, ConfigError};
use crate::core::{is_truthy, labels, Alert, Channel, Severity};

/// Immutable routing state compiled from the raw configuration.
///
/// Every table is pre-filtered: `severity_routes` only contains enabled
/// channels, tag lists are trimmed and deduplicated, source keys are
/// lowercase.
pub struct RoutingTable {
    enabled: Vec<Channel>,
    severity_routes: HashMap<Severity, Vec<Channel>>,
    channel_tags: HashMap<Channel, Vec<String>>,
    source_routes: HashMap<String, HashMap<Severity, Vec<String>>>,
    default_source: String,
    timezone: Tz,
    retry_schedule_ms: Vec<u64>,
    dedupe_window_ms: u64,
    dedupe_max_entries: usize,
}

impl RoutingTable {
    /// Validates and compiles the routing sections of `config`.
    ///
    /// # Returns
    /// * `Err` for an unknown timezone, a zero retry delay, or a zero
    ///   deduplication window or capacity. These are fatal at startup.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let timezone: Tz = config
            .routing
            .timezone
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidTimezone(config.routing.timezone.clone()))?;

        if config.dispatch.retry_schedule_ms.iter().any(|&delay| delay == 0) {
            return Err(ConfigError::InvalidRetrySchedule);
        }
        if config.deduplication.window_ms == 0 {
            return Err(ConfigError::InvalidDedupeWindow);
        }
        if config.deduplication.max_entries == 0 {
            return Err(ConfigError::InvalidDedupeCapacity);
        }

        let enabled = uniq_channels(&config.routing.enabled_channels);

        let severity_routes = config
            .routing
            .route_by_severity
            .iter()
            .map(|(&severity, channels)| {
                let filtered: Vec<Channel> = uniq_channels(channels)
                    .into_iter()
                    .filter(|channel| enabled.contains(channel))
                    .collect();
                (severity, filtered)
            })
            .collect();

        // Every channel routes to its own name unless remapped.
        let mut channel_tags = HashMap::new();
        for channel in Channel::ALL {
            let configured = config
                .routing
                .channel_tags
                .get(&channel)
                .map(|tags| normalize_tags(tags))
                .unwrap_or_default();
            if configured.is_empty() {
                channel_tags.insert(channel, vec![channel.as_str().to_string()]);
            } else {
                channel_tags.insert(channel, configured);
            }
        }

        let mut source_routes = HashMap::new();
        for (source, by_severity) in &config.routing.source_routes {
            let source = source.trim().to_lowercase();
            if source.is_empty() {
                continue;
            }
            let mut compiled: HashMap<Severity, Vec<String>> = HashMap::new();
            for (&severity, tags) in by_severity {
                let tags = normalize_tags(tags);
                if !tags.is_empty() {
                    compiled.insert(severity, tags);
                }
            }
            if !compiled.is_empty() {
                source_routes.insert(source, compiled);
            }
        }

        let default_source = {
            let trimmed = config.routing.default_source.trim();
            if trimmed.is_empty() {
                "notify-gateway".to_string()
            } else {
                trimmed.to_lowercase()
            }
        };

        Ok(Self {
            enabled,
            severity_routes,
            channel_tags,
            source_routes,
            default_source,
            timezone,
            retry_schedule_ms: config.dispatch.retry_schedule_ms.clone(),
            dedupe_window_ms: config.deduplication.window_ms,
            dedupe_max_entries: config.deduplication.max_entries,
        })
    }

    /// Resolves the delivery tags for one alert.
    ///
    /// Decision order, first match wins:
    /// 1. a truthy `notify_mute` label or annotation mutes the alert
    /// 2. `notify_channels` label or annotation overrides routing, filtered
    ///    to enabled channels
    /// 3. a per-source route for the alert's source and severity
    /// 4. the severity route
    ///
    /// An empty result means "deliver nowhere" and is counted as skipped by
    /// the dispatcher.
    pub fn resolve_tags(&self, alert: &Alert) -> Vec<String> {
        if is_truthy(alert.labels.get(labels::MUTE))
            || is_truthy(alert.annotations.get(labels::MUTE))
        {
            debug!("alert muted by label");
            return Vec::new();
        }

        let requested = parse_channels(
            alert
                .labels
                .get(labels::CHANNELS)
                .or_else(|| alert.annotations.get(labels::CHANNELS)),
        );
        if !requested.is_empty() {
            let allowed: Vec<Channel> = requested
                .into_iter()
                .filter(|channel| self.enabled.contains(channel))
                .collect();
            return self.map_channels(&allowed);
        }

        let source = alert
            .label_str("source")
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.default_source.clone());
        let severity = Severity::normalize(alert.labels.get("severity"));

        if let Some(by_severity) = self.source_routes.get(&source) {
            if let Some(tags) = by_severity.get(&severity) {
                if !tags.is_empty() {
                    return tags.clone();
                }
            }
        }

        match self.severity_routes.get(&severity) {
            Some(channels) => self.map_channels(channels),
            None => Vec::new(),
        }
    }

    fn map_channels(&self, channels: &[Channel]) -> Vec<String> {
        let mut tags = Vec::new();
        for channel in channels {
            match self.channel_tags.get(channel) {
                Some(mapped) => tags.extend(mapped.iter().cloned()),
                None => tags.push(channel.as_str().to_string()),
            }
        }
        uniq(tags)
    }

    /// Tags that address `channel` in notifier target registrations.
    pub fn tags_for_channel(&self, channel: Channel) -> &[String] {
        self.channel_tags
            .get(&channel)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn enabled_channels(&self) -> &[Channel] {
        &self.enabled
    }

    pub fn default_source(&self) -> &str {
        &self.default_source
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn retry_schedule(&self) -> &[u64] {
        &self.retry_schedule_ms
    }

    pub fn dedupe_window_ms(&self) -> u64 {
        self.dedupe_window_ms
    }

    pub fn dedupe_max_entries(&self) -> usize {
        self.dedupe_max_entries
    }
}

/// Parses a channel-list value from labels or an ingest event. Accepts a
/// comma-separated string or an array of strings; unknown channel names are
/// dropped, order is preserved, duplicates removed.
pub fn parse_channels(value: Option<&Value>) -> Vec<Channel> {
    let mut names: Vec<String> = Vec::new();
    match value {
        Some(Value::String(raw)) => {
            names.extend(
                raw.split(',')
                    .map(|part| part.trim().to_lowercase())
                    .filter(|part| !part.is_empty()),
            );
        }
        Some(Value::Array(items)) => {
            names.extend(
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|part| part.trim().to_lowercase())
                    .filter(|part| !part.is_empty()),
            );
        }
        _ => {}
    }

    let mut seen = HashSet::new();
    names
        .iter()
        .filter_map(|name| name.parse::<Channel>().ok())
        .filter(|channel| seen.insert(*channel))
        .collect()
}

/// Trims entries, drops empties, removes duplicates while preserving order.
pub fn normalize_tags(raw: &[String]) -> Vec<String> {
    uniq(
        raw.iter()
            .map(|tag| tag.trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect(),
    )
}

fn uniq(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

fn uniq_channels(channels: &[Channel]) -> Vec<Channel> {
    let mut seen = HashSet::new();
    channels
        .iter()
        .copied()
        .filter(|channel| seen.insert(*channel))
        .collect()
}
