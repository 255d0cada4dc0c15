//! Axum-based HTTP gateway.
//!
//! Two webhook routes share one pipeline (decode → detect → parse →
//! orchestrate → deliver); they differ only in their error contract.
//! `/assistant` reports failures to the caller in the detected channel's
//! shape, while `/webhook/telegram` always acknowledges with 200 so
//! Telegram does not redeliver the update. Body size and request timeout
//! limits are enforced at the router layer.

use crate::agent::Orchestrator;
use crate::channels::{ChannelAdapter, ChannelRegistry, DeliveryMode};
use crate::channels::twilio::render_twiml;
use crate::config::Config;
use crate::error::BridgeError;
use crate::providers::{OpenAiProvider, Provider};
use crate::store::{ConversationStore, DebtSource, SqliteStore};
use crate::tools::default_tools;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Maximum request body size (64KB).
pub const MAX_BODY_SIZE: usize = 65_536;
/// Request timeout, seconds.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Fixed user-facing apology for inline-channel failures. Internal error
/// detail goes to the log, never to the user.
const INLINE_APOLOGY: &str =
    "Lo sentimos, ocurrió un problema al procesar tu mensaje. Inténtalo nuevamente en unos minutos.";

pub struct AppState {
    pub channels: Arc<ChannelRegistry>,
    pub orchestrator: Arc<Orchestrator>,
}

/// Build all runtime collaborators from config and serve until shutdown.
pub async fn run(config: Config) -> Result<()> {
    let store = Arc::new(SqliteStore::open(&config.database.path)?);
    let channels = Arc::new(ChannelRegistry::from_config(&config));
    if channels.is_empty() {
        tracing::warn!("no channel adapters configured; every webhook will be rejected");
    }
    let tools = Arc::new(default_tools(store.clone() as Arc<dyn DebtSource>));
    let provider: Arc<dyn Provider> = Arc::new(OpenAiProvider::new(&config.ai)?);
    let orchestrator = Arc::new(Orchestrator::new(
        channels.clone(),
        tools,
        provider,
        store as Arc<dyn ConversationStore>,
        config.ai.history_size,
    ));
    let state = Arc::new(AppState {
        channels,
        orchestrator,
    });

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(%addr, "gateway listening");
    axum::serve(listener, router(state))
        .await
        .context("gateway server error")?;
    Ok(())
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/assistant", post(assistant_webhook))
        .route("/webhook/telegram", post(telegram_webhook))
        .route("/health", get(health))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::new(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Multiplexed webhook: any configured provider may post here. The reply
/// travels back inline or out-of-band depending on the detected adapter.
async fn assistant_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(payload) = decode_body(&headers, &body) else {
        return bad_request("request body is neither JSON nor form-encoded");
    };
    let Some(provider_key) = state.channels.detect(&payload) else {
        tracing::warn!("webhook payload matched no registered channel");
        return bad_request("no registered channel matches the payload");
    };
    let Ok(adapter) = state.channels.adapter(provider_key) else {
        return bad_request("no registered channel matches the payload");
    };
    let adapter = adapter.clone();

    let message = match adapter.parse(&payload) {
        Ok(message) => message,
        Err(err) => return channel_error(adapter.as_ref(), &err),
    };
    tracing::info!(
        provider = message.provider_key,
        sender = %message.sender_id,
        "inbound message"
    );

    let text = match state.orchestrator.respond(&message).await {
        Ok(text) => text,
        Err(err) => return channel_error(adapter.as_ref(), &err),
    };

    match adapter.delivery_mode() {
        DeliveryMode::Inline => match adapter.render_inline(&text) {
            Some(reply) => (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, reply.content_type),
                    (header::CACHE_CONTROL, "private, no-cache"),
                ],
                reply.body,
            )
                .into_response(),
            None => Json(serde_json::json!({"success": true})).into_response(),
        },
        DeliveryMode::OutOfBand => match adapter.send(&message.sender_id, &text).await {
            Ok(()) => Json(serde_json::json!({"success": true})).into_response(),
            Err(err) => channel_error(adapter.as_ref(), &err),
        },
    }
}

/// Telegram's dedicated route. Always acknowledges 200 regardless of
/// outcome; a non-200 would make Telegram redeliver the update forever.
async fn telegram_webhook(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let ack = || (StatusCode::OK, Json(serde_json::json!({"success": true}))).into_response();

    let Ok(payload) = serde_json::from_slice::<serde_json::Value>(&body) else {
        tracing::warn!("telegram webhook body is not JSON");
        return ack();
    };
    let message = match state.channels.parse(&payload) {
        Ok(message) => message,
        Err(err) => {
            tracing::warn!(error = %err, "telegram webhook payload rejected");
            return ack();
        }
    };
    match state.orchestrator.respond(&message).await {
        Ok(text) => {
            if let Err(err) = state
                .channels
                .send(message.provider_key, &message.sender_id, &text)
                .await
            {
                tracing::error!(error = %err, "telegram delivery failed");
            }
        }
        Err(err) => tracing::error!(error = %err, "telegram message cycle failed"),
    }
    ack()
}

fn bad_request(detail: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({"error": detail})),
    )
        .into_response()
}

/// Post-detection failure, shaped for the channel that will read it.
fn channel_error(adapter: &dyn ChannelAdapter, err: &BridgeError) -> Response {
    tracing::error!(
        provider = adapter.provider_key(),
        error = %err,
        "message cycle failed"
    );
    match adapter.delivery_mode() {
        DeliveryMode::Inline => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [
                (header::CONTENT_TYPE, "text/xml"),
                (header::CACHE_CONTROL, "no-store"),
            ],
            render_twiml(INLINE_APOLOGY),
        )
            .into_response(),
        DeliveryMode::OutOfBand => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": "internal error"})),
        )
            .into_response(),
    }
}

/// Decode the raw webhook body into one JSON value for detection. Twilio
/// posts form-encoded; everyone else posts JSON. With no usable
/// content-type, try JSON first, then the form shape.
fn decode_body(headers: &HeaderMap, body: &[u8]) -> Option<serde_json::Value> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if content_type.contains("json") {
        return serde_json::from_slice(body).ok();
    }
    if content_type.contains("x-www-form-urlencoded") {
        return form_to_json(std::str::from_utf8(body).ok()?);
    }
    serde_json::from_slice(body)
        .ok()
        .or_else(|| form_to_json(std::str::from_utf8(body).ok()?))
}

/// `a=1&b=2` → `{"a": "1", "b": "2"}`, with percent-decoding and `+` as
/// space per the form encoding.
fn form_to_json(raw: &str) -> Option<serde_json::Value> {
    let mut map = serde_json::Map::new();
    for pair in raw.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = key.replace('+', " ");
        let key = urlencoding::decode(&key).ok()?;
        let value = value.replace('+', " ");
        let value = urlencoding::decode(&value).ok()?;
        map.insert(
            key.into_owned(),
            serde_json::Value::String(value.into_owned()),
        );
    }
    if map.is_empty() {
        None
    } else {
        Some(serde_json::Value::Object(map))
    }
}
