use super::{ChatMessage, Provider};
use crate::config::AiConfig;
use crate::tools::TOOL_CALL_MARKER;
use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// OpenAI-compatible chat-completions client.
///
/// Works against api.openai.com or any compatible endpoint via the
/// configurable base URL. Tool use is prompt-guided: the marker protocol
/// lives in the system prompt, and `tool`-role transcript messages are
/// folded into `[TOOL_RESULT]`-prefixed user messages, since the plain
/// completions wire format has no free-standing tool role.
pub struct OpenAiProvider {
    base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiProvider {
    pub fn new(config: &AiConfig) -> anyhow::Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .context("ai.api_key (or OPENAI_API_KEY) is not set")?;
        Ok(Self {
            base_url: config
                .base_url
                .as_deref()
                .unwrap_or("https://api.openai.com/v1")
                .trim_end_matches('/')
                .to_string(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client: Client::new(),
        })
    }

    fn wire_messages(system_prompt: &str, transcript: &[ChatMessage]) -> Vec<WireMessage> {
        let mut messages = Vec::with_capacity(transcript.len() + 1);
        messages.push(WireMessage {
            role: "system".into(),
            content: system_prompt.to_string(),
        });
        for m in transcript {
            if m.role == "tool" {
                messages.push(WireMessage {
                    role: "user".into(),
                    content: format!("[TOOL_RESULT] {}", m.content),
                });
            } else {
                messages.push(WireMessage {
                    role: m.role.clone(),
                    content: m.content.clone(),
                });
            }
        }
        messages
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn complete(
        &self,
        system_prompt: &str,
        transcript: &[ChatMessage],
    ) -> anyhow::Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: Self::wire_messages(system_prompt, transcript),
            temperature: self.temperature,
            max_tokens: Some(self.max_tokens),
        };

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Completion request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_body = resp.text().await.unwrap_or_default();
            tracing::error!("Completion API error: {status} — {error_body}");
            anyhow::bail!("completion API returned {status}");
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .context("Failed to decode completion response")?;
        let text = parsed
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .filter(|c| !c.trim().is_empty())
            .context("Completion response carried no text content")?;

        tracing::debug!(
            chars = text.len(),
            tool_call = text.trim_start().starts_with(TOOL_CALL_MARKER),
            "completion received"
        );
        Ok(text)
    }
}
