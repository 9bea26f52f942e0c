//! Rendering of alerts into channel-agnostic notification messages.
//!
//! Channels receive plain text. Anything channel-specific (markup, colors)
//! is applied by the channel senders, not here.

use chrono_tz::Tz;
use serde_json::{Map, Value};

use crate::core::labels::{CHANNELS, MUTE};
use crate::core::{parse_datetime, Alert, AlertStatus, Message, Severity};
use crate::routing::RoutingTable;

/// Maximum title length in characters, ellipsis included.
pub const MAX_TITLE_CHARS: usize = 180;
/// Maximum body length in characters, ellipsis included.
pub const MAX_BODY_CHARS: usize = 3500;

const ELLIPSIS: &str = "...";

/// Renders one alert into a [`Message`].
///
/// The title is `[SEVERITY][STATUS][source] alertname`. The body carries the
/// summary, the optional description, timestamps localized to the configured
/// timezone, and the alert labels minus the routing control labels. Both
/// parts are truncated to their character budgets.
///
/// `batch_status` applies when the alert has no status of its own.
pub fn build_message(alert: &Alert, batch_status: AlertStatus, routing: &RoutingTable) -> Message {
    let severity = Severity::normalize(alert.labels.get("severity"));
    let status = alert
        .status
        .as_deref()
        .filter(|raw| !raw.trim().is_empty())
        .map(AlertStatus::from_raw)
        .unwrap_or(batch_status);

    let source = alert.label_str("source").filter(|s| !s.is_empty()).unwrap_or("unknown");
    let alertname = alert
        .label_str("alertname")
        .filter(|s| !s.is_empty())
        .unwrap_or("GatewayEvent");

    let summary = alert
        .annotation_str("summary")
        .filter(|s| !s.is_empty())
        .or_else(|| alert.annotation_str("description").filter(|s| !s.is_empty()))
        .unwrap_or("(no summary)");

    let timezone = routing.timezone();
    let mut lines = vec![format!("summary: {summary}")];
    if let Some(description) = alert.annotation_str("description").filter(|s| !s.is_empty()) {
        lines.push(format!("description: {description}"));
    }
    lines.push(format!(
        "startsAt: {}",
        format_timestamp(alert.starts_at.as_deref(), timezone)
    ));
    if let Some(ends_at) = alert.ends_at.as_deref().filter(|s| !s.is_empty()) {
        lines.push(format!("endsAt: {}", format_timestamp(Some(ends_at), timezone)));
    }
    lines.push(format!("labels: {}", format_labels(&alert.labels)));

    let title = format!(
        "[{}][{}][{}] {}",
        severity.as_upper(),
        status.as_upper(),
        source,
        alertname
    );

    Message {
        title: truncate(&title, MAX_TITLE_CHARS),
        body: truncate(&lines.join("\n"), MAX_BODY_CHARS),
        severity,
        status,
    }
}

/// Localizes a stored timestamp for display as
/// `YYYY-MM-DD HH:MM:SS (Zone/Name)`. Missing or empty values render as
/// `-`; unparsable values are echoed verbatim.
fn format_timestamp(raw: Option<&str>, timezone: Tz) -> String {
    let Some(raw) = raw else {
        return "-".to_string();
    };
    if raw.is_empty() {
        return "-".to_string();
    }
    match parse_datetime(raw) {
        Some(parsed) => {
            let localized = parsed.with_timezone(&timezone);
            format!("{} ({})", localized.format("%Y-%m-%d %H:%M:%S"), timezone.name())
        }
        None => raw.to_string(),
    }
}

fn format_labels(label_map: &Map<String, Value>) -> String {
    let rendered: Vec<String> = label_map
        .iter()
        .filter(|(key, _)| key.as_str() != CHANNELS && key.as_str() != MUTE)
        .map(|(key, value)| format!("{}={}", key, display_value(value)))
        .collect();
    if rendered.is_empty() {
        "-".to_string()
    } else {
        rendered.join(", ")
    }
}

// Strings render bare; everything else uses its JSON form.
fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated: String = text
        .chars()
        .take(max_chars.saturating_sub(ELLIPSIS.len()))
        .collect();
    truncated.push_str(ELLIPSIS);
    truncated
}
