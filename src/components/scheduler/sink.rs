use crate::error::{delivery_error, BotResult};
use async_trait::async_trait;
use reqwest::Client;
use tracing::info;
use url::Url;

/// Delivery boundary for due reminders. The engine hands over the rule
/// message, the event content and the opaque destination channel; what
/// the channel id means is entirely the sink's business.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, message: &str, content: &str, channel: u64) -> BotResult<()>;
}

/// Sink that only logs deliveries; used when no webhook is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, message: &str, content: &str, channel: u64) -> BotResult<()> {
        info!(channel, reminder = message, content, "Reminder due");
        Ok(())
    }
}

/// Sink that relays notifications to an HTTP webhook as JSON
pub struct WebhookSink {
    client: Client,
    endpoint: Url,
}

impl WebhookSink {
    pub fn new(endpoint: &str) -> BotResult<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| delivery_error(&format!("Invalid webhook URL: {}", e)))?;
        Ok(Self {
            client: Client::new(),
            endpoint,
        })
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn deliver(&self, message: &str, content: &str, channel: u64) -> BotResult<()> {
        let payload = serde_json::json!({
            "channel_id": channel.to_string(),
            "message": message,
            "content": content,
        });

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&payload)
            .send()
            .await
            .map_err(|e| delivery_error(&format!("Failed to reach webhook: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Could not read error response".to_string());
            return Err(delivery_error(&format!(
                "Webhook rejected notification: HTTP {} - {}",
                status, body
            )));
        }

        Ok(())
    }
}
