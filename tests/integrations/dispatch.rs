//! Integration tests driving the dispatch pipeline end to end: routing
//! tables and delivery targets built from real configuration, messages
//! delivered to live (mock) HTTP receivers.

use notify_gateway::config::{Config, WebhookTarget};
use notify_gateway::core::{AlertStatus, Severity};
use notify_gateway::deduplication::DedupeCache;
use notify_gateway::dispatch::{AlertBatch, Dispatcher};
use notify_gateway::notification::TaggedNotifier;
use notify_gateway::routing::RoutingTable;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Routes critical alerts from the `payments` source to an `ops` webhook
/// target; everything else falls back to the (targetless) severity routes.
fn test_config(server_uri: &str) -> Config {
    let mut config = Config::default();
    config.routing.source_routes = HashMap::from([(
        "payments".to_string(),
        HashMap::from([(Severity::Critical, vec!["ops".to_string()])]),
    )]);
    config.channels.webhooks = vec![WebhookTarget {
        url: format!("{server_uri}/receive"),
        tags: vec!["ops".to_string()],
    }];
    config.dispatch.retry_schedule_ms = vec![50, 50];
    config
}

fn build_dispatcher(config: &Config) -> Dispatcher {
    let routing = Arc::new(RoutingTable::from_config(config).unwrap());
    let notifier = Arc::new(TaggedNotifier::from_config(&config.channels, &routing).unwrap());
    let dedupe = Arc::new(DedupeCache::new(
        routing.dedupe_window_ms(),
        routing.dedupe_max_entries(),
    ));
    Dispatcher::new(routing, dedupe, notifier)
}

fn payments_alert(severity: &str, name: &str) -> Value {
    json!({
        "labels": {"alertname": name, "severity": severity, "source": "payments"},
        "annotations": {"summary": "queue is backing up"},
        "startsAt": "2024-05-01T12:00:00Z",
    })
}

#[tokio::test]
async fn routed_alert_reaches_the_webhook_target() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/receive"))
        .and(body_partial_json(json!({"severity": "critical", "status": "firing"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let dispatcher = build_dispatcher(&test_config(&server.uri()));
    let batch = AlertBatch {
        status: AlertStatus::Firing,
        alerts: vec![payments_alert("critical", "QueueBacklog")],
    };

    let counters = dispatcher.dispatch(&batch).await;

    assert_eq!((counters.sent, counters.skipped, counters.failed), (1, 0, 0));
}

#[tokio::test]
async fn transient_target_failures_are_retried_to_success() {
    let server = MockServer::start().await;
    // The first two attempts hit a failing mock, the third lands on the
    // healthy one.
    Mock::given(method("POST"))
        .and(path("/receive"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/receive"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let dispatcher = build_dispatcher(&test_config(&server.uri()));
    let batch = AlertBatch {
        status: AlertStatus::Firing,
        alerts: vec![payments_alert("critical", "QueueBacklog")],
    };

    let counters = dispatcher.dispatch(&batch).await;

    assert_eq!((counters.sent, counters.skipped, counters.failed), (1, 0, 0));
}

#[tokio::test]
async fn exhausted_retries_count_the_tag_as_failed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/receive"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let dispatcher = build_dispatcher(&test_config(&server.uri()));
    let batch = AlertBatch {
        status: AlertStatus::Firing,
        alerts: vec![payments_alert("critical", "QueueBacklog")],
    };

    let counters = dispatcher.dispatch(&batch).await;

    assert_eq!((counters.sent, counters.skipped, counters.failed), (0, 0, 1));
}

#[tokio::test]
async fn repeated_batches_are_suppressed_by_the_dedupe_window() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/receive"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let dispatcher = build_dispatcher(&test_config(&server.uri()));
    let batch = AlertBatch {
        status: AlertStatus::Firing,
        alerts: vec![payments_alert("critical", "QueueBacklog")],
    };

    let first = dispatcher.dispatch(&batch).await;
    let second = dispatcher.dispatch(&batch).await;

    assert_eq!((first.sent, first.skipped, first.failed), (1, 0, 0));
    assert_eq!((second.sent, second.skipped, second.failed), (0, 1, 0));
}

#[tokio::test]
async fn tags_without_targets_are_skipped_not_failed() {
    let server = MockServer::start().await;

    // Warning severity falls back to the tg/wecom routes, and no such
    // targets are configured.
    let dispatcher = build_dispatcher(&test_config(&server.uri()));
    let batch = AlertBatch {
        status: AlertStatus::Firing,
        alerts: vec![payments_alert("warning", "QueueBacklog")],
    };

    let counters = dispatcher.dispatch(&batch).await;

    assert_eq!((counters.sent, counters.skipped, counters.failed), (0, 2, 0));
}
