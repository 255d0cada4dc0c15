//! Channel subsystem: one adapter per messaging provider plus the registry
//! that dispatches between them.
//!
//! Each adapter implements [`ChannelAdapter`]: a structural detection
//! predicate over the raw webhook body, a payload→[`CanonicalMessage`]
//! mapping, and the provider's reply mechanism (inline response document or
//! out-of-band API call). The registry holds the closed adapter set in a
//! fixed priority order and is immutable after startup, so concurrent
//! requests read it without synchronization.

pub mod telegram;
pub mod traits;
pub mod twilio;
pub mod waba;

pub use telegram::TelegramChannel;
pub use traits::{CanonicalMessage, ChannelAdapter, DeliveryMode, InlineReply};
pub use twilio::TwilioChannel;
pub use waba::WabaChannel;

use crate::config::Config;
use crate::error::BridgeError;
use std::sync::Arc;

/// The closed set of channel adapters, in detection priority order:
/// twilio, waba, telegram. First matching predicate wins.
pub struct ChannelRegistry {
    adapters: Vec<Arc<dyn ChannelAdapter>>,
}

impl ChannelRegistry {
    /// Build the registry from configuration. Channels without a config
    /// section are simply not registered; relative priority among the
    /// remaining adapters is preserved.
    pub fn from_config(config: &Config) -> Self {
        let mut adapters: Vec<Arc<dyn ChannelAdapter>> = Vec::new();
        if let Some(ref twilio) = config.channels.twilio {
            adapters.push(Arc::new(TwilioChannel::new(twilio)));
        }
        if let Some(ref waba) = config.channels.waba {
            adapters.push(Arc::new(WabaChannel::new(waba)));
        }
        if let Some(ref telegram) = config.channels.telegram {
            adapters.push(Arc::new(TelegramChannel::new(telegram)));
        }
        Self::new(adapters)
    }

    pub fn new(adapters: Vec<Arc<dyn ChannelAdapter>>) -> Self {
        Self { adapters }
    }

    /// Identify which provider produced `payload`. `None` when nothing
    /// matches; callers must treat that as [`BridgeError::UnknownChannel`],
    /// never as a crash.
    pub fn detect(&self, payload: &serde_json::Value) -> Option<&'static str> {
        self.adapters
            .iter()
            .find(|a| a.matches(payload))
            .map(|a| a.provider_key())
    }

    /// Detect, then delegate to the matching adapter's parse.
    pub fn parse(&self, payload: &serde_json::Value) -> Result<CanonicalMessage, BridgeError> {
        let adapter = self
            .adapters
            .iter()
            .find(|a| a.matches(payload))
            .ok_or(BridgeError::UnknownChannel)?;
        adapter.parse(payload)
    }

    /// Look up an adapter by provider key. The key comes from an
    /// already-parsed message, so a miss is an internal inconsistency
    /// ([`BridgeError::UnknownProvider`]), distinct from detection failure.
    pub fn adapter(&self, provider_key: &str) -> Result<&Arc<dyn ChannelAdapter>, BridgeError> {
        self.adapters
            .iter()
            .find(|a| a.provider_key() == provider_key)
            .ok_or_else(|| BridgeError::UnknownProvider(provider_key.to_string()))
    }

    /// Out-of-band send dispatched by provider key.
    pub async fn send(
        &self,
        provider_key: &str,
        destination: &str,
        text: &str,
    ) -> Result<(), BridgeError> {
        self.adapter(provider_key)?.send(destination, text).await
    }

    /// Logical channel type for history partitioning.
    pub fn channel_type_of(&self, provider_key: &str) -> Result<&'static str, BridgeError> {
        Ok(self.adapter(provider_key)?.channel_type())
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TelegramConfig, TwilioConfig, WabaConfig};
    use serde_json::json;

    fn registry() -> ChannelRegistry {
        ChannelRegistry::new(vec![
            Arc::new(TwilioChannel::new(&TwilioConfig {
                account_sid: "AC".into(),
                auth_token: "tok".into(),
                from_number: "+1444".into(),
            })),
            Arc::new(WabaChannel::new(&WabaConfig {
                phone_number_id: "10001".into(),
                access_token: "tok".into(),
            })),
            Arc::new(TelegramChannel::new(&TelegramConfig {
                bot_token: "bot".into(),
            })),
        ])
    }

    fn twilio_payload() -> serde_json::Value {
        json!({"From": "whatsapp:+1555", "Body": "hola"})
    }

    fn waba_payload() -> serde_json::Value {
        json!({"messages": [{"type": "text", "from": "1555", "text": {"body": "hola"}}]})
    }

    fn telegram_payload() -> serde_json::Value {
        json!({"message": {"from": {"id": 9}, "chat": {"id": 9}, "text": "hola"}})
    }

    #[test]
    fn detect_returns_exactly_one_stable_key() {
        let reg = registry();
        for (payload, expected) in [
            (twilio_payload(), "twilio"),
            (waba_payload(), "waba"),
            (telegram_payload(), "telegram"),
        ] {
            assert_eq!(reg.detect(&payload), Some(expected));
            // Stable: same payload, same key across calls.
            assert_eq!(reg.detect(&payload), Some(expected));
        }
    }

    #[test]
    fn detect_none_for_unrecognized_shape() {
        assert_eq!(registry().detect(&json!({"hello": "world"})), None);
    }

    #[test]
    fn parse_unknown_shape_fails_closed() {
        let err = registry().parse(&json!({"hello": "world"})).unwrap_err();
        assert!(matches!(err, BridgeError::UnknownChannel));
    }

    #[test]
    fn parse_twice_yields_identical_message() {
        let reg = registry();
        let payload = twilio_payload();
        assert_eq!(reg.parse(&payload).unwrap(), reg.parse(&payload).unwrap());
    }

    #[tokio::test]
    async fn send_to_unregistered_provider_is_unknown_provider() {
        // Must fail before any network I/O is attempted.
        let err = registry().send("smoke", "+1555", "hi").await.unwrap_err();
        assert!(matches!(err, BridgeError::UnknownProvider(ref p) if p == "smoke"));
    }

    #[test]
    fn channel_type_groups_twilio_and_waba() {
        let reg = registry();
        assert_eq!(reg.channel_type_of("twilio").unwrap(), "whatsapp");
        assert_eq!(reg.channel_type_of("waba").unwrap(), "whatsapp");
        assert_eq!(reg.channel_type_of("telegram").unwrap(), "telegram");
    }

    #[test]
    fn registry_without_config_sections_is_empty() {
        let reg = ChannelRegistry::new(vec![]);
        assert!(reg.is_empty());
        assert_eq!(reg.detect(&twilio_payload()), None);
    }
}
