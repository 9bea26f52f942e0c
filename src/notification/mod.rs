//! Fan-out of rendered messages to the configured delivery targets.
//!
//! Each target is a concrete sender (Telegram bot, WeCom robot, ServerChan
//! key, or a plain webhook) registered under one or more routing tags. The
//! dispatcher addresses targets only by tag; a tag nobody subscribes to is
//! a skip, not an error.

mod channels;

pub use channels::{ServerchanSender, TelegramSender, WebhookSender, WecomSender};

use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::ChannelsConfig;
use crate::core::{Channel, Message, Notifier, NotifyError, NotifyOutcome};
use crate::routing::{normalize_tags, RoutingTable};

/// A single concrete delivery backend.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// Backend name used in logs and failure reports.
    fn name(&self) -> &'static str;

    /// Delivers one rendered message.
    async fn send(&self, message: &Message) -> Result<(), NotifyError>;
}

struct Target {
    tags: Vec<String>,
    sender: Box<dyn ChannelSender>,
}

impl Target {
    fn subscribes_to(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Delivers messages to every registered target subscribed to a tag.
pub struct TaggedNotifier {
    targets: Vec<Target>,
}

impl TaggedNotifier {
    /// Builds delivery targets from the configured channel credentials.
    ///
    /// Channels with incomplete credentials are skipped with a warning so a
    /// partially configured gateway still starts; built-in channels inherit
    /// their tags from the routing table's destination-to-tag map.
    pub fn from_config(channels: &ChannelsConfig, routing: &RoutingTable) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        let mut targets = Vec::new();

        if let Some(telegram) = &channels.telegram {
            if telegram.bot_token.trim().is_empty() || telegram.chat_id.trim().is_empty() {
                warn!("telegram channel is missing bot_token or chat_id, skipping");
            } else {
                targets.push(Target {
                    tags: routing.tags_for_channel(Channel::Tg).to_vec(),
                    sender: Box::new(TelegramSender::new(
                        client.clone(),
                        telegram.bot_token.trim(),
                        telegram.chat_id.trim().to_string(),
                    )),
                });
            }
        }

        if let Some(wecom) = &channels.wecom {
            if wecom.webhook_url.trim().is_empty() {
                warn!("wecom channel is missing webhook_url, skipping");
            } else {
                targets.push(Target {
                    tags: routing.tags_for_channel(Channel::Wecom).to_vec(),
                    sender: Box::new(WecomSender::new(
                        client.clone(),
                        wecom.webhook_url.trim().to_string(),
                    )),
                });
            }
        }

        if let Some(serverchan) = &channels.serverchan {
            if serverchan.send_key.trim().is_empty() {
                warn!("serverchan channel is missing send_key, skipping");
            } else {
                targets.push(Target {
                    tags: routing.tags_for_channel(Channel::Serverchan).to_vec(),
                    sender: Box::new(ServerchanSender::new(
                        client.clone(),
                        serverchan.send_key.trim(),
                    )),
                });
            }
        }

        for webhook in &channels.webhooks {
            let url = webhook.url.trim();
            if url.is_empty() {
                warn!("webhook target is missing a url, skipping");
                continue;
            }
            let tags = normalize_tags(&webhook.tags);
            if tags.is_empty() {
                warn!(url, "webhook target has no tags and will never be selected");
            }
            targets.push(Target {
                tags,
                sender: Box::new(WebhookSender::new(client.clone(), url.to_string())),
            });
        }

        for target in &targets {
            info!(
                channel = target.sender.name(),
                tags = ?target.tags,
                "registered notification target"
            );
        }

        Ok(Self { targets })
    }

    /// Number of registered delivery targets.
    pub fn target_count(&self) -> usize {
        self.targets.len()
    }
}

#[async_trait]
impl Notifier for TaggedNotifier {
    async fn notify(&self, tag: &str, message: &Message) -> Result<NotifyOutcome, NotifyError> {
        let matching: Vec<&Target> = self
            .targets
            .iter()
            .filter(|target| target.subscribes_to(tag))
            .collect();
        if matching.is_empty() {
            return Ok(NotifyOutcome::Skipped);
        }

        // Every matching target gets an attempt even when an earlier one
        // fails; failures are aggregated into one report for the tag.
        let mut failures = Vec::new();
        for target in matching {
            if let Err(error) = target.sender.send(message).await {
                warn!(
                    channel = target.sender.name(),
                    tag,
                    error = %error,
                    "notification target failed"
                );
                failures.push(format!("{}: {}", target.sender.name(), error));
            }
        }

        if failures.is_empty() {
            Ok(NotifyOutcome::Sent)
        } else {
            Err(NotifyError::Delivery {
                tag: tag.to_string(),
                detail: failures.join("; "),
            })
        }
    }
}
