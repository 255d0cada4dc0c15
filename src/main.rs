use anyhow::{bail, Context, Result};
use cauce::channels::TelegramChannel;
use cauce::config::Config;
use cauce::store::SqliteStore;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "cauce", version, about = "Multi-channel conversational webhook bridge")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the webhook gateway.
    Serve,
    /// Create the database schema (idempotent) and exit.
    InitDb,
    /// Register the public webhook URL with the Telegram Bot API.
    SetTelegramWebhook {
        /// Public HTTPS URL Telegram should post updates to.
        url: String,
    },
    /// Upsert a debt fixture for a user (development tooling).
    SetDebt {
        external_id: String,
        amount: f64,
        /// Due date, YYYY-MM-DD.
        due_date: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respects RUST_LOG, defaults to INFO.
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Serve => cauce::gateway::run(config).await,
        Commands::InitDb => {
            let store = SqliteStore::open(&config.database.path)?;
            store.initialize()?;
            tracing::info!(path = %config.database.path.display(), "database schema ready");
            Ok(())
        }
        Commands::SetTelegramWebhook { url } => {
            let Some(telegram) = config.channels.telegram.as_ref() else {
                bail!("[channels.telegram] is not configured");
            };
            let channel = TelegramChannel::new(telegram);
            channel.set_webhook(&url).await?;
            tracing::info!(%url, "telegram webhook registered");
            Ok(())
        }
        Commands::SetDebt {
            external_id,
            amount,
            due_date,
        } => {
            let due = NaiveDate::parse_from_str(&due_date, "%Y-%m-%d")
                .context("due_date must be YYYY-MM-DD")?;
            let store = SqliteStore::open(&config.database.path)?;
            store.set_debt(&external_id, amount, due)?;
            tracing::info!(%external_id, amount, "debt record written");
            Ok(())
        }
    }
}
