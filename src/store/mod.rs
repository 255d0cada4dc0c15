//! Persistence collaborators.
//!
//! The bridge consumes storage through two narrow traits:
//! [`ConversationStore`] (identity resolution + append-only history) and
//! [`DebtSource`] (the upstream data behind `get_status`). The SQLite
//! implementation in [`sqlite`] covers both; tests substitute in-memory
//! doubles.

pub mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

/// Stable internal identity for a (channel type, external id) pair.
/// Created lazily on first message; never deleted by the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityHandle {
    pub identity_id: i64,
    pub global_user_id: i64,
    pub channel_type: String,
    pub external_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One persisted conversation turn. Append-only; ordering is by timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Conversation history keyed by per-channel-type user identity.
///
/// Each call is individually atomic; the bridge relies on append ordering
/// but never on cross-call transactions.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn resolve_or_create_identity(
        &self,
        channel_type: &str,
        external_id: &str,
        display_name: Option<&str>,
    ) -> anyhow::Result<IdentityHandle>;

    async fn append_turn(
        &self,
        identity: &IdentityHandle,
        role: Role,
        text: &str,
    ) -> anyhow::Result<()>;

    /// Most recent turns, newest first.
    async fn recent_turns(
        &self,
        identity: &IdentityHandle,
        limit: usize,
    ) -> anyhow::Result<Vec<ConversationTurn>>;
}

/// A user's outstanding debt, when any.
#[derive(Debug, Clone, PartialEq)]
pub struct DebtRecord {
    pub amount: f64,
    pub due_date: NaiveDate,
}

/// Upstream debt data consumed by the `get_status` tool.
#[async_trait]
pub trait DebtSource: Send + Sync {
    async fn debt_for(&self, external_id: &str) -> anyhow::Result<Option<DebtRecord>>;
}
