//! HTTP API of the gateway.
//!
//! Three ingest surfaces share one dispatch pipeline: simplified events
//! (`/ingest/v1/event`, strictly validated), raw alert batches
//! (`/ingest/v1/alerts`), and Alertmanager webhooks
//! (`/dispatch/v1/alertmanager`). The ingest endpoints acknowledge with 202
//! and dispatch in a detached task; the Alertmanager endpoint dispatches
//! inline and reports the delivery counters, matching what an Alertmanager
//! receiver expects.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};
use tracing::info;

use crate::core::AlertStatus;
use crate::dispatch::{spawn_detached, AlertBatch, Dispatcher};
use crate::ingest;
use crate::internal_metrics::Metrics;
use crate::routing::RoutingTable;

/// Shared state behind every request handler.
pub struct GatewayState {
    pub routing: Arc<RoutingTable>,
    pub dispatcher: Arc<Dispatcher>,
    /// Token guarding the ingest endpoints.
    pub ingest_token: String,
    /// Token guarding the Alertmanager webhook endpoint.
    pub webhook_token: String,
    pub metrics: Metrics,
}

/// Builds the gateway router.
///
/// `POST /` is an alias of the event endpoint kept for producers that only
/// support a bare base URL.
pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/", post(ingest_event))
        .route("/ingest/v1/event", post(ingest_event))
        .route("/ingest/v1/alerts", post(ingest_alerts))
        .route("/dispatch/v1/alertmanager", post(dispatch_alertmanager))
        .with_state(state)
}

async fn healthz() -> Json<Value> {
    Json(json!({"ok": true, "service": "notify-gateway"}))
}

async fn ingest_event(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !authorized(&headers, &state.ingest_token) {
        return unauthorized();
    }
    let Ok(parsed) = serde_json::from_slice::<Value>(&body) else {
        return bad_request("body must be valid json");
    };
    let event = match ingest::validate_event(&parsed) {
        Ok(event) => event,
        Err(message) => return bad_request(&message),
    };

    let batch = AlertBatch {
        status: AlertStatus::normalize(event.get("status")),
        alerts: vec![ingest::alert_from_event(event, &state.routing)],
    };
    state.metrics.alerts_received_total.increment(1);
    spawn_detached(Arc::clone(&state.dispatcher), batch);

    (StatusCode::ACCEPTED, Json(json!({"accepted": 1}))).into_response()
}

async fn ingest_alerts(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !authorized(&headers, &state.ingest_token) {
        return unauthorized();
    }
    let Ok(parsed) = serde_json::from_slice::<Value>(&body) else {
        return bad_request("body must be valid json");
    };

    // A bare array is treated as a firing batch; an object carries its own
    // batch status alongside `alerts`.
    let (status, alerts) = match parsed {
        Value::Array(alerts) => (AlertStatus::Firing, alerts),
        Value::Object(mut object) => {
            let status = AlertStatus::normalize(object.get("status"));
            match object.remove("alerts") {
                Some(Value::Array(alerts)) => (status, alerts),
                _ => {
                    return bad_request("body must be an alerts array or an object with alerts[]")
                }
            }
        }
        _ => return bad_request("body must be an alerts array or an object with alerts[]"),
    };

    let accepted = alerts.len();
    state.metrics.alerts_received_total.increment(accepted as u64);
    spawn_detached(Arc::clone(&state.dispatcher), AlertBatch { status, alerts });

    (StatusCode::ACCEPTED, Json(json!({"accepted": accepted}))).into_response()
}

async fn dispatch_alertmanager(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !authorized(&headers, &state.webhook_token) {
        return unauthorized();
    }
    let Ok(parsed) = serde_json::from_slice::<Value>(&body) else {
        return bad_request("body must be valid json");
    };

    let Value::Object(mut object) = parsed else {
        return bad_request("invalid alertmanager payload");
    };
    let status = AlertStatus::normalize(object.get("status"));
    let alerts = match object.remove("alerts") {
        Some(Value::Array(alerts)) => alerts,
        _ => return bad_request("invalid alertmanager payload: alerts must be an array"),
    };

    state.metrics.alerts_received_total.increment(alerts.len() as u64);
    let counters = state.dispatcher.dispatch(&AlertBatch { status, alerts }).await;
    info!(
        sent = counters.sent,
        skipped = counters.skipped,
        failed = counters.failed,
        "alertmanager payload dispatched"
    );

    (
        StatusCode::OK,
        Json(json!({
            "ok": true,
            "sent": counters.sent,
            "skipped": counters.skipped,
            "failed": counters.failed,
        })),
    )
        .into_response()
}

/// Extracts the token from a `Bearer <token>` authorization header.
/// The scheme is case-insensitive and the token must be non-empty.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

fn authorized(headers: &HeaderMap, expected: &str) -> bool {
    bearer_token(headers).is_some_and(|token| token == expected)
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({"error": "unauthorized"}))).into_response()
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({"error": message}))).into_response()
}
