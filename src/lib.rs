#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::uninlined_format_args
)]

//! Multi-channel conversational webhook bridge.
//!
//! Normalizes inbound webhooks from messaging providers (Twilio WhatsApp,
//! the WhatsApp Business Cloud API, Telegram) into one canonical message
//! shape, drives a bounded single-round tool-calling conversation against a
//! chat-completion model, persists per-user history, and replies through
//! each provider's native mechanism.

pub mod agent;
pub mod channels;
pub mod config;
pub mod error;
pub mod gateway;
pub mod providers;
pub mod store;
pub mod tools;

pub use config::Config;
pub use error::BridgeError;
