#![deny(missing_docs)]
//! Telegram transport adapter for the chanmirror bots.

/// Telegram-specific bot/transport implementation.
pub mod bot;
/// Telegram transport configuration.
pub mod config;
/// `MessagingGateway` over the Telegram Bot API.
pub mod gateway;
/// Liveness HTTP endpoint.
pub mod liveness;
/// Telegram runtime entrypoint.
pub mod runner;
