#![deny(missing_docs)]
//! Chanmirror core library.
//!
//! Channel mirroring job, document persistence, the messaging gateway
//! contract and the attach/admin services shared by both bots.

/// Admin command logic (static anchor, forward channel, test copy).
pub mod admin;
/// Attach-link storage and delivery.
pub mod attach;
/// Configuration management.
pub mod config;
/// Persisted document shapes.
pub mod documents;
/// Messaging gateway contract and error classification.
pub mod gateway;
/// Scheduled mirror cycle (pre-check, backup, repost).
pub mod mirror;
/// Daily calendar triggers.
pub mod schedule;
/// Pending-interaction sessions.
pub mod session;
/// Document store backends (file, JSONBin, R2).
pub mod store;
/// In-memory fakes for the store and gateway.
pub mod testing;
