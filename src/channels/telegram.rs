use super::traits::{CanonicalMessage, ChannelAdapter, DeliveryMode};
use crate::config::TelegramConfig;
use crate::error::BridgeError;
use async_trait::async_trait;

/// Telegram bot webhook channel.
///
/// Inbound updates carry `message` (or `edited_message`); replies go
/// out-of-band through the Bot API. Telegram penalizes webhook endpoints
/// that answer non-200, so the gateway exposes a dedicated best-effort
/// route for this channel that always acknowledges.
pub struct TelegramChannel {
    bot_token: String,
    api_url: String,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            bot_token: config.bot_token.clone(),
            api_url: "https://api.telegram.org".to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Register `webhook_url` with the Bot API so Telegram starts pushing
    /// updates to the gateway.
    pub async fn set_webhook(&self, webhook_url: &str) -> anyhow::Result<()> {
        let url = format!("{}/bot{}/setWebhook", self.api_url, self.bot_token);
        let body = serde_json::json!({
            "url": webhook_url,
            "max_connections": 40
        });

        let resp = self.client.post(&url).json(&body).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let error_body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Failed to set webhook: {status} — {error_body}");
        }
        Ok(())
    }
}

fn display_name_of(message: &serde_json::Value) -> Option<String> {
    let from = message.get("from")?;
    let first = from.get("first_name").and_then(|v| v.as_str());
    let last = from.get("last_name").and_then(|v| v.as_str());
    match (first, last) {
        (Some(f), Some(l)) => Some(format!("{f} {l}")),
        (Some(f), None) => Some(f.to_string()),
        _ => from
            .get("username")
            .and_then(|v| v.as_str())
            .map(ToString::to_string),
    }
}

#[async_trait]
impl ChannelAdapter for TelegramChannel {
    fn provider_key(&self) -> &'static str {
        "telegram"
    }

    fn channel_type(&self) -> &'static str {
        "telegram"
    }

    fn delivery_mode(&self) -> DeliveryMode {
        DeliveryMode::OutOfBand
    }

    fn matches(&self, payload: &serde_json::Value) -> bool {
        payload.get("message").is_some() || payload.get("edited_message").is_some()
    }

    fn parse(&self, payload: &serde_json::Value) -> Result<CanonicalMessage, BridgeError> {
        let message = payload
            .get("message")
            .or_else(|| payload.get("edited_message"))
            .ok_or_else(|| BridgeError::MalformedPayload {
                provider: "telegram",
                detail: "neither 'message' nor 'edited_message' present".into(),
            })?;

        // Telegram ids are numeric and already canonical; stringify as-is.
        let from = message
            .get("from")
            .and_then(|f| f.get("id"))
            .or_else(|| message.get("chat").and_then(|c| c.get("id")))
            .and_then(|v| v.as_i64())
            .ok_or_else(|| BridgeError::MalformedPayload {
                provider: "telegram",
                detail: "message carries no from.id or chat.id".into(),
            })?;

        let text = message
            .get("text")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();

        Ok(CanonicalMessage {
            sender_id: from.to_string(),
            text,
            provider_key: self.provider_key(),
            display_name: display_name_of(message),
        })
    }

    async fn send(&self, destination: &str, text: &str) -> Result<(), BridgeError> {
        let url = format!("{}/bot{}/sendMessage", self.api_url, self.bot_token);
        let body = serde_json::json!({
            "chat_id": destination,
            "text": text,
            "parse_mode": "HTML"
        });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| BridgeError::Delivery {
                provider: "telegram".into(),
                source: e.into(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_body = resp.text().await.unwrap_or_default();
            tracing::error!("Telegram send failed: {status} — {error_body}");
            return Err(BridgeError::Delivery {
                provider: "telegram".into(),
                source: anyhow::anyhow!("Telegram API error: {status}"),
            });
        }

        Ok(())
    }
}
