//! Messaging gateway contract.
//!
//! The chat platform is consumed through [`MessagingGateway`]. Every failure
//! is reduced to one of three buckets by [`classify`], which matches on the
//! platform's human-readable error description. Retry policy belongs to the
//! callers; the gateway performs exactly one attempt per call.

#![allow(clippy::non_std_lazy_statics)]

use crate::documents::ChannelRef;
use async_trait::async_trait;
use lazy_regex::lazy_regex;
use serde_json::Value;
use thiserror::Error;

/// Wait used when a rate-limit description carries no usable number.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 3;

/// Description fragment of a rate-limit response.
pub const RATE_LIMIT_HINT: &str = "retry after";
/// Description fragment of any missing-message response.
pub const NOT_FOUND_HINT: &str = "not found";
/// Description of a delete aimed at a missing message.
pub const DELETE_NOT_FOUND: &str = "message to delete not found";

static RE_FIRST_NUMBER: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"\d+");

/// Classified platform failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Flood control; the same call may be retried after the wait.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },
    /// The message (or chat) does not exist.
    #[error("{description}")]
    NotFound {
        /// Raw platform description.
        description: String,
    },
    /// Anything else, including unrecognised descriptions.
    #[error("{description}")]
    Other {
        /// Raw platform description.
        description: String,
    },
}

impl GatewayError {
    /// Shorthand for an unclassified failure.
    pub fn other(description: impl Into<String>) -> Self {
        Self::Other {
            description: description.into(),
        }
    }

    /// Platform-style description of the failure.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::RateLimited { retry_after_secs } => {
                format!("Too Many Requests: retry after {retry_after_secs}")
            }
            Self::NotFound { description } | Self::Other { description } => description.clone(),
        }
    }
}

/// Classify a platform error description.
///
/// Checks, in order: `"retry after"` (wait = first integer in the text,
/// falling back to [`DEFAULT_RETRY_AFTER_SECS`] when absent or zero), then
/// `"not found"`. Everything else is `Other`.
///
/// # Examples
///
/// ```
/// use chanmirror_core::gateway::{classify, GatewayError};
///
/// assert_eq!(
///     classify("Too Many Requests: retry after 17"),
///     GatewayError::RateLimited { retry_after_secs: 17 }
/// );
/// assert!(matches!(
///     classify("Bad Request: message to copy not found"),
///     GatewayError::NotFound { .. }
/// ));
/// ```
#[must_use]
pub fn classify(description: &str) -> GatewayError {
    if description.contains(RATE_LIMIT_HINT) {
        let retry_after_secs = RE_FIRST_NUMBER
            .find(description)
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
        return GatewayError::RateLimited { retry_after_secs };
    }
    if description.contains(NOT_FOUND_HINT) {
        return GatewayError::NotFound {
            description: description.to_string(),
        };
    }
    GatewayError::other(description)
}

/// Result of a photo send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentPhoto {
    /// Id of the created message.
    pub message_id: i32,
    /// File id of the largest stored size.
    pub file_id: String,
}

/// An entry of a bot's command menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Command name without the slash.
    pub command: String,
    /// Menu description.
    pub description: String,
}

impl CommandSpec {
    /// Build a command menu entry.
    pub fn new(command: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            description: description.into(),
        }
    }
}

/// Chat platform operations used by the bots.
///
/// Message ids are returned for every call that creates a message.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Copy message `message_id` of `from` into `to`.
    async fn copy_message(
        &self,
        to: &ChannelRef,
        from: &ChannelRef,
        message_id: i32,
    ) -> Result<i32, GatewayError>;

    /// Forward message `message_id` of `from` into `to`.
    async fn forward_message(
        &self,
        to: &ChannelRef,
        from: &ChannelRef,
        message_id: i32,
    ) -> Result<i32, GatewayError>;

    /// Delete a message.
    async fn delete_message(&self, chat: &ChannelRef, message_id: i32) -> Result<(), GatewayError>;

    /// Send text with formatting entities.
    async fn send_text(
        &self,
        chat: &ChannelRef,
        text: &str,
        entities: &[Value],
    ) -> Result<i32, GatewayError>;

    /// Send an already-hosted photo with a formatted caption.
    async fn send_photo(
        &self,
        chat: &ChannelRef,
        file_id: &str,
        caption: &str,
        caption_entities: &[Value],
    ) -> Result<SentPhoto, GatewayError>;

    /// Check that a chat is reachable.
    async fn check_chat(&self, chat: &ChannelRef) -> Result<(), GatewayError>;

    /// Replace the bot's command menu.
    async fn set_commands(&self, commands: &[CommandSpec]) -> Result<(), GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_rate_limit_parses_first_number() {
        assert_eq!(
            classify("Too Many Requests: retry after 35"),
            GatewayError::RateLimited {
                retry_after_secs: 35
            }
        );
    }

    #[test]
    fn test_rate_limit_without_number_defaults() {
        assert_eq!(
            classify("please retry after a while"),
            GatewayError::RateLimited {
                retry_after_secs: DEFAULT_RETRY_AFTER_SECS
            }
        );
        assert_eq!(
            classify("retry after 0"),
            GatewayError::RateLimited {
                retry_after_secs: DEFAULT_RETRY_AFTER_SECS
            }
        );
    }

    #[test]
    fn test_rate_limit_wins_over_not_found() {
        assert!(matches!(
            classify("not found, retry after 2"),
            GatewayError::RateLimited {
                retry_after_secs: 2
            }
        ));
    }

    #[test]
    fn test_not_found_variants() {
        for desc in [
            "Bad Request: message to copy not found",
            "Bad Request: message to forward not found",
            "Bad Request: message to delete not found",
            "Bad Request: chat not found",
        ] {
            assert_eq!(
                classify(desc),
                GatewayError::NotFound {
                    description: desc.to_string()
                }
            );
        }
    }

    #[test]
    fn test_unrecognised_is_other() {
        assert_eq!(
            classify("Forbidden: bot is not a member of the channel chat"),
            GatewayError::other("Forbidden: bot is not a member of the channel chat")
        );
        assert_eq!(classify(""), GatewayError::other(""));
        // Matching is case-sensitive.
        assert!(matches!(classify("Message Not Found"), GatewayError::Other { .. }));
    }

    #[test]
    fn test_description_round_trips_through_classify() {
        let limited = GatewayError::RateLimited {
            retry_after_secs: 9,
        };
        assert_eq!(classify(&limited.description()), limited);
    }

    proptest! {
        #[test]
        fn prop_plain_text_never_rate_limited(desc in "[a-z ]{0,40}") {
            prop_assume!(!desc.contains(RATE_LIMIT_HINT));
            let is_rate_limited = matches!(classify(&desc), GatewayError::RateLimited { .. });
            prop_assert!(!is_rate_limited);
        }

        #[test]
        fn prop_retry_after_number_is_extracted(secs in 1u64..100_000) {
            let desc = format!("Too Many Requests: retry after {secs}");
            prop_assert_eq!(classify(&desc), GatewayError::RateLimited { retry_after_secs: secs });
        }
    }
}
