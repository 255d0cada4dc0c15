use super::{ConversationStore, ConversationTurn, DebtRecord, DebtSource, IdentityHandle, Role};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// SQLite-backed conversation store and debt source.
///
/// One connection behind a mutex; every trait call is a single short
/// transaction-free statement (or a find-then-insert pair for lazy identity
/// creation), which matches the per-call atomicity the orchestrator
/// requires.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize()?;
        Ok(store)
    }

    /// In-memory database, used by tests and `init-db --check`.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize()?;
        Ok(store)
    }

    pub fn initialize(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS global_user (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 name TEXT
             );
             CREATE TABLE IF NOT EXISTS user_provider_identity (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 global_user_id INTEGER NOT NULL,
                 provider TEXT NOT NULL,
                 external_id TEXT NOT NULL,
                 UNIQUE(provider, external_id),
                 FOREIGN KEY (global_user_id) REFERENCES global_user(id)
             );
             CREATE TABLE IF NOT EXISTS chat_history (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 user_provider_identity_id INTEGER NOT NULL,
                 message TEXT NOT NULL,
                 role TEXT NOT NULL,
                 timestamp TEXT NOT NULL,
                 FOREIGN KEY (user_provider_identity_id) REFERENCES user_provider_identity(id)
             );
             CREATE INDEX IF NOT EXISTS idx_chat_history_identity
                 ON chat_history(user_provider_identity_id);
             CREATE INDEX IF NOT EXISTS idx_chat_history_timestamp
                 ON chat_history(timestamp);
             CREATE TABLE IF NOT EXISTS user_debt (
                 external_id TEXT PRIMARY KEY,
                 amount REAL NOT NULL,
                 due_date TEXT NOT NULL
             );",
        )
        .context("Failed to initialize database schema")?;
        Ok(())
    }

    /// Upsert a debt record (setup tooling / fixtures).
    pub fn set_debt(&self, external_id: &str, amount: f64, due_date: NaiveDate) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO user_debt (external_id, amount, due_date) VALUES (?1, ?2, ?3)
             ON CONFLICT(external_id) DO UPDATE SET amount = excluded.amount, due_date = excluded.due_date",
            params![external_id, amount, due_date.format("%Y-%m-%d").to_string()],
        )
        .context("Failed to upsert debt record")?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoned lock still holds a usable connection; every statement
        // here is self-contained, so keep going.
        self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn resolve_or_create_identity(
        &self,
        channel_type: &str,
        external_id: &str,
        display_name: Option<&str>,
    ) -> Result<IdentityHandle> {
        let conn = self.lock();

        let existing = conn
            .query_row(
                "SELECT id, global_user_id FROM user_provider_identity
                 WHERE provider = ?1 AND external_id = ?2",
                params![channel_type, external_id],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()
            .context("Failed to look up identity")?;

        if let Some((identity_id, global_user_id)) = existing {
            return Ok(IdentityHandle {
                identity_id,
                global_user_id,
                channel_type: channel_type.to_string(),
                external_id: external_id.to_string(),
            });
        }

        conn.execute(
            "INSERT INTO global_user (name) VALUES (?1)",
            params![display_name.unwrap_or(external_id)],
        )
        .context("Failed to create global user")?;
        let global_user_id = conn.last_insert_rowid();

        conn.execute(
            "INSERT INTO user_provider_identity (global_user_id, provider, external_id)
             VALUES (?1, ?2, ?3)",
            params![global_user_id, channel_type, external_id],
        )
        .context("Failed to create provider identity")?;
        let identity_id = conn.last_insert_rowid();

        Ok(IdentityHandle {
            identity_id,
            global_user_id,
            channel_type: channel_type.to_string(),
            external_id: external_id.to_string(),
        })
    }

    async fn append_turn(
        &self,
        identity: &IdentityHandle,
        role: Role,
        text: &str,
    ) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO chat_history (user_provider_identity_id, message, role, timestamp)
             VALUES (?1, ?2, ?3, ?4)",
            params![identity.identity_id, text, role.as_str(), Utc::now().to_rfc3339()],
        )
        .context("Failed to append conversation turn")?;
        Ok(())
    }

    async fn recent_turns(
        &self,
        identity: &IdentityHandle,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT message, role, timestamp FROM chat_history
                 WHERE user_provider_identity_id = ?1
                 ORDER BY timestamp DESC, id DESC
                 LIMIT ?2",
            )
            .context("Failed to prepare history query")?;

        let rows = stmt
            .query_map(params![identity.identity_id, limit as i64], |row| {
                let text: String = row.get(0)?;
                let role: String = row.get(1)?;
                let timestamp: String = row.get(2)?;
                Ok((text, role, timestamp))
            })
            .context("Failed to query history")?;

        let mut turns = Vec::new();
        for row in rows {
            let (text, role, timestamp) = row?;
            turns.push(ConversationTurn {
                role: if role == "assistant" {
                    Role::Assistant
                } else {
                    Role::User
                },
                text,
                timestamp: parse_timestamp(&timestamp),
            });
        }
        Ok(turns)
    }
}

#[async_trait]
impl DebtSource for SqliteStore {
    async fn debt_for(&self, external_id: &str) -> Result<Option<DebtRecord>> {
        let conn = self.lock();
        let record = conn
            .query_row(
                "SELECT amount, due_date FROM user_debt WHERE external_id = ?1",
                params![external_id],
                |row| {
                    let amount: f64 = row.get(0)?;
                    let due_date: String = row.get(1)?;
                    Ok((amount, due_date))
                },
            )
            .optional()
            .context("Failed to query debt record")?;

        Ok(record.and_then(|(amount, due_date)| {
            NaiveDate::parse_from_str(&due_date, "%Y-%m-%d")
                .ok()
                .map(|due_date| DebtRecord { amount, due_date })
        }))
    }
}
