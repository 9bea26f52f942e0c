//! The dispatch engine: fans alerts out to their delivery tags, suppresses
//! duplicates, and retries failed deliveries on a bounded schedule.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use futures::FutureExt;
use serde_json::Value;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

use crate::core::{
    labels, Alert, AlertStatus, DispatchCounters, Message, Notifier, NotifyError, NotifyOutcome,
};
use crate::deduplication::DedupeCache;
use crate::message::build_message;
use crate::routing::RoutingTable;

/// One batch of raw alerts sharing a batch-level status.
#[derive(Debug, Clone)]
pub struct AlertBatch {
    pub status: AlertStatus,
    pub alerts: Vec<Value>,
}

/// Delivers `message` once per attempt until it lands or the schedule runs
/// out. The schedule allows `schedule_ms.len() + 1` attempts with the listed
/// waits in between.
///
/// A `Skipped` outcome is terminal: an unbound tag will not become bound by
/// retrying.
pub async fn send_with_retry(
    tag: &str,
    message: &Message,
    notifier: &dyn Notifier,
    schedule_ms: &[u64],
) -> Result<NotifyOutcome, NotifyError> {
    let max_attempts = schedule_ms.len() + 1;
    let mut last_error: Option<NotifyError> = None;

    for attempt in 1..=max_attempts {
        match notifier.notify(tag, message).await {
            Ok(NotifyOutcome::Sent) => return Ok(NotifyOutcome::Sent),
            Ok(NotifyOutcome::Skipped) => {
                info!(tag, "no destination bound to tag, delivery skipped");
                return Ok(NotifyOutcome::Skipped);
            }
            Err(err) => {
                warn!(tag, attempt, max_attempts, error = %err, "notification attempt failed");
                if attempt < max_attempts {
                    sleep(Duration::from_millis(schedule_ms[attempt - 1])).await;
                }
                last_error = Some(err);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| NotifyError::Delivery {
        tag: tag.to_string(),
        detail: "send failed without an explicit error".to_string(),
    }))
}

/// Deduplication identity of an alert, in priority order: the explicit
/// `fingerprint` field, the `notify_fingerprint` label, then a hash derived
/// from the alert's content.
pub fn resolve_fingerprint(alert: &Alert) -> String {
    if let Some(explicit) = alert.fingerprint.as_deref().filter(|s| !s.is_empty()) {
        return explicit.to_string();
    }
    if let Some(labeled) = alert.label_str(labels::FINGERPRINT).filter(|s| !s.is_empty()) {
        return labeled.to_string();
    }
    derived_fingerprint(alert)
}

// Hash of labels, annotations, and startsAt in canonical key order. endsAt
// and status stay out so a resolution dedupes against its firing sibling
// only through the status segment of the dedupe key.
fn derived_fingerprint(alert: &Alert) -> String {
    let labels: BTreeMap<&String, &Value> = alert.labels.iter().collect();
    let annotations: BTreeMap<&String, &Value> = alert.annotations.iter().collect();
    let canonical = serde_json::json!({
        "annotations": annotations,
        "labels": labels,
        "startsAt": alert.starts_at.as_deref().unwrap_or(""),
    });
    blake3::hash(canonical.to_string().as_bytes()).to_hex().to_string()
}

/// Routes, renders, deduplicates, and delivers alert batches.
///
/// Delivery outcomes per (alert, tag) pair are counted, never raised: one
/// failing tag does not stop its siblings or the rest of the batch.
pub struct Dispatcher {
    routing: Arc<RoutingTable>,
    dedupe: Arc<DedupeCache>,
    notifier: Arc<dyn Notifier>,
}

enum TagOutcome {
    Sent,
    Skipped,
    Failed,
}

impl Dispatcher {
    pub fn new(
        routing: Arc<RoutingTable>,
        dedupe: Arc<DedupeCache>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            routing,
            dedupe,
            notifier,
        }
    }

    /// Processes one batch and returns its accounting.
    pub async fn dispatch(&self, batch: &AlertBatch) -> DispatchCounters {
        let started = Instant::now();
        let mut counters = DispatchCounters::default();

        for raw in &batch.alerts {
            if !raw.is_object() {
                warn!("discarding non-object alert element");
                counters.failed += 1;
                metrics::counter!("notifications_total", "outcome" => "failed").increment(1);
                continue;
            }
            let alert: Alert = match serde_json::from_value(raw.clone()) {
                Ok(alert) => alert,
                Err(err) => {
                    warn!(error = %err, "discarding undecodable alert element");
                    counters.failed += 1;
                    metrics::counter!("notifications_total", "outcome" => "failed").increment(1);
                    continue;
                }
            };

            let tags = self.routing.resolve_tags(&alert);
            if tags.is_empty() {
                counters.skipped += 1;
                metrics::counter!("notifications_total", "outcome" => "skipped").increment(1);
                continue;
            }

            let message = build_message(&alert, batch.status, &self.routing);
            let fingerprint = resolve_fingerprint(&alert);

            let deliveries = tags
                .iter()
                .map(|tag| self.deliver_tag(tag, &message, &fingerprint));
            for outcome in join_all(deliveries).await {
                match outcome {
                    TagOutcome::Sent => {
                        counters.sent += 1;
                        metrics::counter!("notifications_total", "outcome" => "sent").increment(1);
                    }
                    TagOutcome::Skipped => {
                        counters.skipped += 1;
                        metrics::counter!("notifications_total", "outcome" => "skipped").increment(1);
                    }
                    TagOutcome::Failed => {
                        counters.failed += 1;
                        metrics::counter!("notifications_total", "outcome" => "failed").increment(1);
                    }
                }
            }
        }

        metrics::histogram!("dispatch_duration_seconds").record(started.elapsed().as_secs_f64());
        counters
    }

    async fn deliver_tag(&self, tag: &str, message: &Message, fingerprint: &str) -> TagOutcome {
        // Dedupe per tag: adding a destination to an alert must not be
        // silenced by a delivery that went elsewhere.
        let dedupe_key = format!("{}:{}:{}", fingerprint, message.status, tag);
        if self.dedupe.should_drop(&dedupe_key) {
            info!(tag, fingerprint, "duplicate notification suppressed");
            metrics::counter!("dedupe_suppressed_total").increment(1);
            return TagOutcome::Skipped;
        }

        match send_with_retry(tag, message, self.notifier.as_ref(), self.routing.retry_schedule())
            .await
        {
            Ok(NotifyOutcome::Sent) => TagOutcome::Sent,
            Ok(NotifyOutcome::Skipped) => TagOutcome::Skipped,
            Err(err) => {
                error!(tag, fingerprint, error = %err, "delivery failed after retries");
                TagOutcome::Failed
            }
        }
    }
}

/// Fire-and-forget dispatch for the accepted-then-processed endpoints. The
/// spawned unit owns the batch; dropping the caller (a closed client
/// connection, for instance) does not cancel it. Panics are contained and
/// logged.
pub fn spawn_detached(dispatcher: Arc<Dispatcher>, batch: AlertBatch) {
    tokio::spawn(async move {
        match AssertUnwindSafe(dispatcher.dispatch(&batch)).catch_unwind().await {
            Ok(counters) => {
                info!(
                    sent = counters.sent,
                    skipped = counters.skipped,
                    failed = counters.failed,
                    "background dispatch finished"
                );
            }
            Err(_) => error!("background dispatch panicked"),
        }
    });
}
