use crate::error::BridgeError;
use async_trait::async_trait;

/// A normalized inbound message, independent of the wire format that
/// produced it. Produced once by an adapter's `parse` and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalMessage {
    /// Provider-normalized user identifier (e.g. E.164 phone, Telegram id).
    pub sender_id: String,
    pub text: String,
    /// Registry key of the adapter that produced this message.
    pub provider_key: &'static str,
    /// Human-readable name, when the wire payload carries one.
    pub display_name: Option<String>,
}

/// How an adapter delivers replies.
///
/// Declared per adapter rather than inferred from the presence of an
/// optional reply handle, so the delivery step can branch explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// The reply IS the webhook's HTTP response body, in the provider's
    /// required document format.
    Inline,
    /// The reply goes out through a separate authenticated API call; the
    /// webhook response is only an acknowledgment.
    OutOfBand,
}

/// A rendered inline reply document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineReply {
    pub content_type: &'static str,
    pub body: String,
}

/// One messaging provider: payload detection, canonical mapping, and reply
/// delivery. Implementations own any provider-required identifier
/// normalization; normalizing an already-normalized identifier must be a
/// no-op.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Registry key used for dispatch.
    fn provider_key(&self) -> &'static str;

    /// Logical channel category used only for history partitioning.
    /// Distinct from the provider key: several providers may share one
    /// channel type (twilio and waba both carry WhatsApp conversations).
    fn channel_type(&self) -> &'static str;

    fn delivery_mode(&self) -> DeliveryMode;

    /// Cheap structural predicate over the raw inbound body. Predicates are
    /// kept mutually exclusive across the registered set; where shapes could
    /// overlap, registration order is the documented priority.
    fn matches(&self, payload: &serde_json::Value) -> bool;

    /// Map a matching payload to a canonical message. Fails with
    /// `MalformedPayload` when expected substructure is absent even though
    /// the top-level shape matched.
    fn parse(&self, payload: &serde_json::Value) -> Result<CanonicalMessage, BridgeError>;

    /// Out-of-band send through the provider's API. Not retried here;
    /// failure surfaces to the caller as `Delivery`.
    async fn send(&self, destination: &str, text: &str) -> Result<(), BridgeError>;

    /// Render the reply as an inline response document. `Some` only for
    /// adapters whose `delivery_mode` is `Inline`.
    fn render_inline(&self, _text: &str) -> Option<InlineReply> {
        None
    }
}
