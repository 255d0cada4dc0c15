use super::traits::{CanonicalMessage, ChannelAdapter, DeliveryMode, InlineReply};
use crate::config::TwilioConfig;
use crate::error::BridgeError;
use async_trait::async_trait;

/// Twilio messaging webhook channel (SMS / WhatsApp-via-Twilio).
///
/// Twilio POSTs a form-encoded body with `From` and `Body`; the gateway
/// decodes it into a JSON object before detection. Replies are inline:
/// the webhook's own response body is a TwiML document, so a normal turn
/// performs no outbound API call. The REST send path exists for the rare
/// out-of-band case (e.g. replying after the webhook response was already
/// committed).
pub struct TwilioChannel {
    account_sid: String,
    auth_token: String,
    from_number: String,
    api_url: String,
    client: reqwest::Client,
}

/// Strip the `whatsapp:` transport prefix and ensure a leading `+`.
/// Idempotent: an already-canonical number passes through unchanged.
pub fn normalize_twilio_number(input: &str) -> String {
    let bare = input.strip_prefix("whatsapp:").unwrap_or(input);
    if bare.starts_with('+') {
        bare.to_string()
    } else {
        format!("+{bare}")
    }
}

/// Format a canonical number for the Twilio API (`whatsapp:+...`).
/// Idempotent: an already-formatted destination is not double-prefixed.
pub fn format_for_twilio(phone: &str) -> String {
    if phone.starts_with("whatsapp:") {
        return phone.to_string();
    }
    let plussed = if phone.starts_with('+') {
        phone.to_string()
    } else {
        format!("+{phone}")
    };
    format!("whatsapp:{plussed}")
}

fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Build the TwiML messaging response document Twilio expects as the
/// webhook's answer body.
pub fn render_twiml(message: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response><Message>{}</Message></Response>",
        xml_escape(message)
    )
}

impl TwilioChannel {
    pub fn new(config: &TwilioConfig) -> Self {
        Self {
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            from_number: config.from_number.clone(),
            api_url: "https://api.twilio.com".to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ChannelAdapter for TwilioChannel {
    fn provider_key(&self) -> &'static str {
        "twilio"
    }

    fn channel_type(&self) -> &'static str {
        "whatsapp"
    }

    fn delivery_mode(&self) -> DeliveryMode {
        DeliveryMode::Inline
    }

    fn matches(&self, payload: &serde_json::Value) -> bool {
        payload.get("From").is_some() && payload.get("Body").is_some()
    }

    fn parse(&self, payload: &serde_json::Value) -> Result<CanonicalMessage, BridgeError> {
        let from = payload
            .get("From")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| BridgeError::MalformedPayload {
                provider: "twilio",
                detail: "'From' is not a non-empty string".into(),
            })?;
        let body = payload
            .get("Body")
            .and_then(|v| v.as_str())
            .ok_or_else(|| BridgeError::MalformedPayload {
                provider: "twilio",
                detail: "'Body' is not a string".into(),
            })?;

        Ok(CanonicalMessage {
            sender_id: normalize_twilio_number(from),
            text: body.to_string(),
            provider_key: self.provider_key(),
            display_name: payload
                .get("ProfileName")
                .and_then(|v| v.as_str())
                .map(ToString::to_string),
        })
    }

    async fn send(&self, destination: &str, text: &str) -> Result<(), BridgeError> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_url, self.account_sid
        );
        let form = [
            ("To", format_for_twilio(destination)),
            ("From", format_for_twilio(&self.from_number)),
            ("Body", text.to_string()),
        ];

        let resp = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(|e| BridgeError::Delivery {
                provider: "twilio".into(),
                source: e.into(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_body = resp.text().await.unwrap_or_default();
            tracing::error!("Twilio send failed: {status} — {error_body}");
            return Err(BridgeError::Delivery {
                provider: "twilio".into(),
                source: anyhow::anyhow!("Twilio API error: {status}"),
            });
        }

        Ok(())
    }

    fn render_inline(&self, text: &str) -> Option<InlineReply> {
        Some(InlineReply {
            content_type: "text/xml",
            body: render_twiml(text),
        })
    }
}
