//! Concrete HTTP senders for the built-in notification channels.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::core::{Message, NotifyError};

use super::ChannelSender;

/// Telegram Bot API sender (`sendMessage`).
pub struct TelegramSender {
    client: reqwest::Client,
    url: String,
    chat_id: String,
}

impl TelegramSender {
    pub fn new(client: reqwest::Client, bot_token: &str, chat_id: String) -> Self {
        Self {
            client,
            url: format!("https://api.telegram.org/bot{bot_token}/sendMessage"),
            chat_id,
        }
    }
}

#[async_trait]
impl ChannelSender for TelegramSender {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn send(&self, message: &Message) -> Result<(), NotifyError> {
        let payload = json!({
            "chat_id": self.chat_id,
            "text": format!("{}\n\n{}", message.title, message.body),
        });
        post_json(&self.client, self.name(), &self.url, &payload).await
    }
}

/// WeCom group-robot webhook sender.
pub struct WecomSender {
    client: reqwest::Client,
    webhook_url: String,
}

impl WecomSender {
    pub fn new(client: reqwest::Client, webhook_url: String) -> Self {
        Self { client, webhook_url }
    }
}

#[async_trait]
impl ChannelSender for WecomSender {
    fn name(&self) -> &'static str {
        "wecom"
    }

    async fn send(&self, message: &Message) -> Result<(), NotifyError> {
        let payload = json!({
            "msgtype": "text",
            "text": { "content": format!("{}\n\n{}", message.title, message.body) },
        });
        post_json(&self.client, self.name(), &self.webhook_url, &payload).await
    }
}

/// ServerChan (sctapi.ftqq.com) sender.
pub struct ServerchanSender {
    client: reqwest::Client,
    url: String,
}

impl ServerchanSender {
    pub fn new(client: reqwest::Client, send_key: &str) -> Self {
        Self {
            client,
            url: format!("https://sctapi.ftqq.com/{send_key}.send"),
        }
    }
}

#[async_trait]
impl ChannelSender for ServerchanSender {
    fn name(&self) -> &'static str {
        "serverchan"
    }

    async fn send(&self, message: &Message) -> Result<(), NotifyError> {
        let payload = json!({
            "title": message.title,
            "desp": message.body,
        });
        post_json(&self.client, self.name(), &self.url, &payload).await
    }
}

/// Generic JSON webhook sender for custom receivers.
pub struct WebhookSender {
    client: reqwest::Client,
    url: String,
}

impl WebhookSender {
    pub fn new(client: reqwest::Client, url: String) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl ChannelSender for WebhookSender {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, message: &Message) -> Result<(), NotifyError> {
        let payload = json!({
            "title": message.title,
            "body": message.body,
            "severity": message.severity.as_str(),
            "status": message.status.as_str(),
        });
        post_json(&self.client, self.name(), &self.url, &payload).await
    }
}

async fn post_json(
    client: &reqwest::Client,
    channel: &'static str,
    url: &str,
    payload: &Value,
) -> Result<(), NotifyError> {
    let response = client
        .post(url)
        .json(payload)
        .send()
        .await
        .map_err(|source| NotifyError::Request { channel, source })?;

    let status = response.status();
    if status.is_success() {
        debug!(channel, "notification accepted");
        return Ok(());
    }

    let body = response.text().await.unwrap_or_default();
    Err(NotifyError::Rejected {
        channel,
        status: status.as_u16(),
        body,
    })
}
