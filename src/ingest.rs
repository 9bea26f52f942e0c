//! Validation and normalization of simplified ingest events.
//!
//! Ingest events are a flat, producer-friendly shape. This module checks
//! them strictly (unlike alert batches, which are processed best-effort)
//! and converts each one into a standard alert object for dispatch.

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::core::{labels, parse_datetime, AlertStatus, Channel, Severity};
use crate::routing::{parse_channels, RoutingTable};

/// Checks an ingest event body. Returns the event object on success and a
/// client-facing error message on the first violation found.
pub fn validate_event(body: &Value) -> Result<&Map<String, Value>, String> {
    let Some(event) = body.as_object() else {
        return Err("body must be an object".to_string());
    };

    if !has_nonempty_string(event, "source") {
        return Err("source is required and must be a string".to_string());
    }
    if !has_nonempty_string(event, "summary") {
        return Err("summary is required and must be a string".to_string());
    }

    let severity_valid = event
        .get("severity")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_ascii_lowercase())
        .is_some_and(|s| s.parse::<Severity>().is_ok());
    if !severity_valid {
        return Err("severity must be one of critical|warning|info".to_string());
    }

    if let Some(status) = event.get("status").filter(|v| !v.is_null()) {
        match status.as_str().map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("firing") => {}
            Some("resolved") => {
                let ends_at_missing = match event.get("endsAt") {
                    None | Some(Value::Null) => true,
                    Some(Value::String(s)) => s.is_empty(),
                    Some(_) => false,
                };
                if ends_at_missing {
                    return Err("endsAt is required when status=resolved".to_string());
                }
            }
            _ => return Err("status must be firing|resolved".to_string()),
        }
    }

    if let Some(event_labels) = event.get("labels").filter(|v| !v.is_null()) {
        if !event_labels.is_object() {
            return Err("labels must be an object when provided".to_string());
        }
    }

    if let Some(channels) = event.get("channels").filter(|v| !v.is_null()) {
        if !channels.is_string() && !channels.is_array() {
            return Err(
                "channels must be string[] or comma-separated string when provided".to_string()
            );
        }
    }

    for key in ["startsAt", "endsAt"] {
        if let Some(value) = event.get(key).filter(|v| !v.is_null()) {
            if value.as_str().and_then(parse_datetime).is_none() {
                return Err(format!("{key} must be a valid ISO datetime when provided"));
            }
        }
    }

    Ok(event)
}

/// Converts a validated ingest event into a standard alert object.
///
/// Event fields become labels (`source`, `severity`, `alertname`) and
/// annotations (`summary`, `description`), merged over any the event already
/// carries. Channel overrides and explicit fingerprints are re-expressed as
/// the corresponding `notify_*` labels so the regular routing path handles
/// them. Timestamps are normalized to UTC; a missing `startsAt` becomes the
/// current time.
pub fn alert_from_event(event: &Map<String, Value>, routing: &RoutingTable) -> Value {
    let now = now_iso();
    let status = AlertStatus::normalize(event.get("status"));
    let severity = Severity::normalize(event.get("severity"));

    let mut alert_labels = event
        .get("labels")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    // Read before the inserts below overwrite the incoming value.
    let alertname = event
        .get("alertname")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .or_else(|| {
            alert_labels
                .get("alertname")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
        })
        .unwrap_or("GatewayEvent")
        .to_string();
    let source = event
        .get("source")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| routing.default_source())
        .to_string();

    alert_labels.insert("source".to_string(), Value::String(source));
    alert_labels.insert("severity".to_string(), Value::String(severity.to_string()));
    alert_labels.insert("alertname".to_string(), Value::String(alertname));

    if let Some(fingerprint) = event
        .get("fingerprint")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
    {
        alert_labels.insert(
            labels::FINGERPRINT.to_string(),
            Value::String(fingerprint.to_string()),
        );
    }

    let requested = parse_channels(event.get("channels"));
    if !requested.is_empty() {
        let joined = requested.iter().map(Channel::as_str).collect::<Vec<_>>().join(",");
        alert_labels.insert(labels::CHANNELS.to_string(), Value::String(joined));
    }

    let mut annotations = event
        .get("annotations")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let summary = event
        .get("summary")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or("(no summary)")
        .to_string();
    let description = event
        .get("description")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .or_else(|| {
            event
                .get("summary")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
        })
        .unwrap_or("")
        .to_string();
    annotations.insert("summary".to_string(), Value::String(summary));
    annotations.insert("description".to_string(), Value::String(description));

    let mut alert = Map::new();
    alert.insert("labels".to_string(), Value::Object(alert_labels));
    alert.insert("annotations".to_string(), Value::Object(annotations));
    alert.insert(
        "startsAt".to_string(),
        Value::String(normalize_iso(event.get("startsAt"), &now)),
    );
    if status == AlertStatus::Resolved {
        alert.insert(
            "endsAt".to_string(),
            Value::String(normalize_iso(event.get("endsAt"), &now)),
        );
    }
    Value::Object(alert)
}

fn has_nonempty_string(event: &Map<String, Value>, key: &str) -> bool {
    event.get(key).and_then(Value::as_str).is_some_and(|s| !s.is_empty())
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Re-renders a timestamp as UTC RFC 3339 with a `Z` suffix, falling back
/// to `fallback` when the value is absent or unparsable.
fn normalize_iso(value: Option<&Value>, fallback: &str) -> String {
    value
        .and_then(Value::as_str)
        .and_then(parse_datetime)
        .map(|parsed| parsed.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| fallback.to_string())
}
