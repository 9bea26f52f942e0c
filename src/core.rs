//! Core domain types and service traits for the notification gateway.
//!
//! This module defines the fundamental data structures and trait contracts
//! that govern component interactions throughout the application.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Label keys with routing semantics. Producers attach these to alerts to
/// override the configured routing.
pub mod labels {
    /// Truthy value suppresses every notification for the alert.
    pub const MUTE: &str = "notify_mute";
    /// Comma-separated channel names (or a list) overriding severity routing.
    pub const CHANNELS: &str = "notify_channels";
    /// Caller-supplied deduplication identity.
    pub const FINGERPRINT: &str = "notify_fingerprint";
}

/// Alert severity, normalized from free-form label values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    #[default]
    Info,
}

impl Severity {
    /// Normalizes an arbitrary JSON label value. Anything that is not one of
    /// the known severity names collapses to `Info`.
    pub fn normalize(raw: Option<&Value>) -> Self {
        raw.and_then(Value::as_str)
            .and_then(|s| s.trim().to_ascii_lowercase().parse().ok())
            .unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }

    /// Uppercase form used in rendered message titles.
    pub fn as_upper(&self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::Warning => "WARNING",
            Severity::Info => "INFO",
        }
    }
}

impl FromStr for Severity {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(Severity::Critical),
            "warning" => Ok(Severity::Warning),
            "info" => Ok(Severity::Info),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of an alert. Unknown values normalize to `Firing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    #[default]
    Firing,
    Resolved,
}

impl AlertStatus {
    /// Normalizes an arbitrary JSON value to a status.
    pub fn normalize(raw: Option<&Value>) -> Self {
        raw.and_then(Value::as_str).map(Self::from_raw).unwrap_or_default()
    }

    /// Normalizes a raw string. Everything except `resolved` is `Firing`.
    pub fn from_raw(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("resolved") {
            AlertStatus::Resolved
        } else {
            AlertStatus::Firing
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Firing => "firing",
            AlertStatus::Resolved => "resolved",
        }
    }

    /// Uppercase form used in rendered message titles.
    pub fn as_upper(&self) -> &'static str {
        match self {
            AlertStatus::Firing => "FIRING",
            AlertStatus::Resolved => "RESOLVED",
        }
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A deliverable notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Tg,
    Wecom,
    Serverchan,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Tg, Channel::Wecom, Channel::Serverchan];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Tg => "tg",
            Channel::Wecom => "wecom",
            Channel::Serverchan => "serverchan",
        }
    }
}

impl FromStr for Channel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tg" => Ok(Channel::Tg),
            "wecom" => Ok(Channel::Wecom),
            "serverchan" => Ok(Channel::Serverchan),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single alert as received on the wire.
///
/// Producers are sloppy: labels may be missing or not an object, timestamps
/// may be numbers, extra keys may be present. Deserialization coerces instead
/// of rejecting, so a malformed field degrades to its default rather than
/// failing the whole alert.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Alert {
    #[serde(default, deserialize_with = "object_or_empty")]
    pub labels: Map<String, Value>,
    #[serde(default, deserialize_with = "object_or_empty")]
    pub annotations: Map<String, Value>,
    #[serde(
        default,
        rename = "startsAt",
        deserialize_with = "string_or_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub starts_at: Option<String>,
    #[serde(
        default,
        rename = "endsAt",
        deserialize_with = "string_or_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub ends_at: Option<String>,
    #[serde(default, deserialize_with = "string_or_none", skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "string_or_none", skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

impl Alert {
    /// Returns a label value if it is present and a string.
    pub fn label_str(&self, key: &str) -> Option<&str> {
        self.labels.get(key).and_then(Value::as_str)
    }

    /// Returns an annotation value if it is present and a string.
    pub fn annotation_str(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).and_then(Value::as_str)
    }
}

fn object_or_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Object(map) => map,
        _ => Map::new(),
    })
}

fn string_or_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => Some(s),
        _ => None,
    })
}

/// A rendered notification ready for delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub title: String,
    pub body: String,
    pub severity: Severity,
    pub status: AlertStatus,
}

/// Per-batch dispatch accounting, returned to synchronous callers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchCounters {
    pub sent: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Terminal result of a delivery attempt that did not error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// Every destination bound to the tag accepted the notification.
    Sent,
    /// No destination is bound to the tag. Not an error.
    Skipped,
}

/// Errors surfaced by notification backends.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Transport-level failure reaching a channel endpoint.
    #[error("request to {channel} failed: {source}")]
    Request {
        channel: &'static str,
        #[source]
        source: reqwest::Error,
    },
    /// The channel endpoint answered with a non-success status.
    #[error("{channel} rejected the notification: status {status}, body: {body}")]
    Rejected {
        channel: &'static str,
        status: u16,
        body: String,
    },
    /// At least one destination bound to the tag failed.
    #[error("delivery for tag '{tag}' failed: {detail}")]
    Delivery { tag: String, detail: String },
}

// =============================================================================
// Service Traits
// =============================================================================

/// Delivers a rendered message to every destination bound to a tag.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends `message` to all destinations bound to `tag`.
    ///
    /// # Returns
    /// * `Ok(NotifyOutcome::Sent)` when every bound destination accepted it
    /// * `Ok(NotifyOutcome::Skipped)` when nothing is bound to the tag
    /// * `Err` when at least one bound destination failed
    async fn notify(&self, tag: &str, message: &Message) -> Result<NotifyOutcome, NotifyError>;
}

// =============================================================================
// Coercion helpers for loosely-typed wire data
// =============================================================================

/// Interprets a JSON value the way a human reads a feature flag: the literals
/// `1`, `true`, `yes`, `on` (any case) and boolean `true` are truthy,
/// everything else is not.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(s)) => {
            matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
        }
        _ => false,
    }
}

/// Parses an ISO 8601 timestamp, with or without an explicit offset.
/// Naive timestamps are assumed to be UTC. Returns `None` when the input
/// cannot be parsed.
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}
