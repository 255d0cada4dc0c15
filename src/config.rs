//! Runtime configuration.
//!
//! Loaded from a TOML file (every field defaulted, so an empty file is
//! valid), then overlaid with the environment variables the deployment
//! environments historically used (`OPENAI_API_KEY`, `TELEGRAM_BOT_TOKEN`,
//! ...). A channel adapter is only registered when its config section is
//! present.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Bounded recent-window of turns replayed to the model.
    #[serde(default = "default_history_size")]
    pub history_size: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            history_size: default_history_size(),
            api_key: None,
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twilio: Option<TwilioConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waba: Option<WabaConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram: Option<TelegramConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    /// Sender number for out-of-band messages, E.164.
    pub from_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WabaConfig {
    pub phone_number_id: String,
    pub access_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_temperature() -> f64 {
    0.2
}
fn default_max_tokens() -> u32 {
    512
}
fn default_history_size() -> usize {
    6
}
fn default_db_path() -> PathBuf {
    PathBuf::from("cauce.db")
}

impl Config {
    /// Read `path` if it exists (absent file ⇒ all defaults), then apply
    /// env overrides and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Environment variables win over file values. Names follow the
    /// conventions the service has always deployed with.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("PORT") {
            if let Ok(port) = v.parse() {
                self.server.port = port;
            }
        }
        if let Ok(v) = std::env::var("OPENAI_API_KEY") {
            self.ai.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("OPENAI_BASE_URL") {
            self.ai.base_url = Some(v);
        }
        if let Ok(v) = std::env::var("OPENAI_MODEL") {
            self.ai.model = v;
        }
        if let Ok(v) = std::env::var("MODEL_TEMPERATURE") {
            if let Ok(t) = v.parse() {
                self.ai.temperature = t;
            }
        }
        if let Ok(v) = std::env::var("MAX_TOKENS") {
            if let Ok(t) = v.parse() {
                self.ai.max_tokens = t;
            }
        }
        if let Ok(v) = std::env::var("HISTORY_SIZE") {
            if let Ok(n) = v.parse() {
                self.ai.history_size = n;
            }
        }
        if let Ok(v) = std::env::var("DATABASE_PATH") {
            self.database.path = PathBuf::from(v);
        }
        if let (Ok(sid), Ok(token)) = (
            std::env::var("TWILIO_ACCOUNT_SID"),
            std::env::var("TWILIO_AUTH_TOKEN"),
        ) {
            let from_number = std::env::var("TWILIO_FROM_NUMBER")
                .ok()
                .or_else(|| self.channels.twilio.as_ref().map(|t| t.from_number.clone()))
                .unwrap_or_default();
            self.channels.twilio = Some(TwilioConfig {
                account_sid: sid,
                auth_token: token,
                from_number,
            });
        }
        if let (Ok(id), Ok(token)) = (
            std::env::var("WABA_PHONE_NUMBER_ID"),
            std::env::var("WABA_ACCESS_TOKEN"),
        ) {
            self.channels.waba = Some(WabaConfig {
                phone_number_id: id,
                access_token: token,
            });
        }
        if let Ok(token) = std::env::var("TELEGRAM_BOT_TOKEN") {
            self.channels.telegram = Some(TelegramConfig { bot_token: token });
        }
    }

    /// Catch values that would fail at arbitrary runtime points.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.ai.temperature) {
            anyhow::bail!(
                "ai.temperature must be between 0.0 and 2.0 (got {})",
                self.ai.temperature
            );
        }
        if self.ai.history_size == 0 {
            anyhow::bail!("ai.history_size must be at least 1");
        }
        if self.ai.model.trim().is_empty() {
            anyhow::bail!("ai.model must not be empty");
        }
        Ok(())
    }
}
