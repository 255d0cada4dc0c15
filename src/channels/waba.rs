use super::traits::{CanonicalMessage, ChannelAdapter, DeliveryMode};
use crate::config::WabaConfig;
use crate::error::BridgeError;
use async_trait::async_trait;

/// WhatsApp Business API (Cloud API) channel.
///
/// Inbound webhook bodies carry a `messages` array; only `type == "text"`
/// entries are handled. Replies always go out-of-band through the Graph API
/// send endpoint; the webhook response is just an acknowledgment.
pub struct WabaChannel {
    phone_number_id: String,
    access_token: String,
    api_url: String,
    client: reqwest::Client,
}

/// Ensure a leading `+` (E.164). Idempotent.
pub fn normalize_waba_number(input: &str) -> String {
    if input.starts_with('+') {
        input.to_string()
    } else {
        format!("+{input}")
    }
}

/// The Graph API wants bare digits, no `+`.
pub fn format_for_waba(phone: &str) -> String {
    phone.strip_prefix('+').unwrap_or(phone).to_string()
}

impl WabaChannel {
    pub fn new(config: &WabaConfig) -> Self {
        Self {
            phone_number_id: config.phone_number_id.clone(),
            access_token: config.access_token.clone(),
            api_url: "https://graph.facebook.com/v18.0".to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ChannelAdapter for WabaChannel {
    fn provider_key(&self) -> &'static str {
        "waba"
    }

    fn channel_type(&self) -> &'static str {
        "whatsapp"
    }

    fn delivery_mode(&self) -> DeliveryMode {
        DeliveryMode::OutOfBand
    }

    fn matches(&self, payload: &serde_json::Value) -> bool {
        payload
            .get("messages")
            .and_then(|m| m.get(0))
            .and_then(|m| m.get("type"))
            .and_then(|t| t.as_str())
            == Some("text")
    }

    fn parse(&self, payload: &serde_json::Value) -> Result<CanonicalMessage, BridgeError> {
        let msg = payload
            .get("messages")
            .and_then(|m| m.get(0))
            .ok_or_else(|| BridgeError::MalformedPayload {
                provider: "waba",
                detail: "messages[0] absent".into(),
            })?;
        let from = msg
            .get("from")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| BridgeError::MalformedPayload {
                provider: "waba",
                detail: "messages[0].from absent".into(),
            })?;
        let text = msg
            .get("text")
            .and_then(|t| t.get("body"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| BridgeError::MalformedPayload {
                provider: "waba",
                detail: "messages[0].text.body absent".into(),
            })?;

        // Cloud API puts the sender's profile name in a parallel contacts array.
        let display_name = payload
            .get("contacts")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("profile"))
            .and_then(|p| p.get("name"))
            .and_then(|v| v.as_str())
            .map(ToString::to_string);

        Ok(CanonicalMessage {
            sender_id: normalize_waba_number(from),
            text: text.to_string(),
            provider_key: self.provider_key(),
            display_name,
        })
    }

    async fn send(&self, destination: &str, text: &str) -> Result<(), BridgeError> {
        let url = format!("{}/{}/messages", self.api_url, self.phone_number_id);
        let body = serde_json::json!({
            "messaging_product": "whatsapp",
            "to": format_for_waba(destination),
            "type": "text",
            "text": { "body": text }
        });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| BridgeError::Delivery {
                provider: "waba".into(),
                source: e.into(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_body = resp.text().await.unwrap_or_default();
            tracing::error!("WABA send failed: {status} — {error_body}");
            return Err(BridgeError::Delivery {
                provider: "waba".into(),
                source: anyhow::anyhow!("Graph API error: {status}"),
            });
        }

        Ok(())
    }
}
