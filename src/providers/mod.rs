//! Model-completion collaborator.
//!
//! The orchestrator treats the language model as an opaque function:
//! system prompt + role-tagged transcript in, text out. [`openai`]
//! implements the trait against any OpenAI-compatible chat-completions
//! endpoint; tests substitute scripted mocks.

pub mod openai;

pub use openai::OpenAiProvider;

use async_trait::async_trait;

/// A single message in a completion transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
        }
    }

    /// A tool-result message. Providers without a native tool role fold
    /// these into the prompt-guided `[TOOL_RESULT]` convention.
    pub fn tool(content: impl Into<String>) -> Self {
        Self {
            role: "tool".into(),
            content: content.into(),
        }
    }
}

/// One completion call. The transcript excludes the system prompt and is
/// ordered oldest-first, ending with the turn the model should answer.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        transcript: &[ChatMessage],
    ) -> anyhow::Result<String>;
}
