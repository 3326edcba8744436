//! Persisted JSON document shapes.
//!
//! Field names are the on-store schema and must not change.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;

/// A chat reference: numeric chat id or public `@handle`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelRef {
    /// Numeric chat id (negative for channels).
    Id(i64),
    /// Public username including the leading `@`.
    Username(String),
}

impl ChannelRef {
    /// Reference a channel by its public handle, adding `@` if missing.
    #[must_use]
    pub fn handle(name: &str) -> Self {
        if name.starts_with('@') {
            Self::Username(name.to_string())
        } else {
            Self::Username(format!("@{name}"))
        }
    }
}

impl From<i64> for ChannelRef {
    fn from(id: i64) -> Self {
        Self::Id(id)
    }
}

impl fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Username(name) => f.write_str(name),
        }
    }
}

/// Channel identities and the static anchor post (`storage` document).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageDocument {
    /// Main (public) channel holding the static anchor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_channel: Option<ChannelRef>,
    /// Anchor post id in the main channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_message_id: Option<i32>,
    /// Private backup channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward_channel_id: Option<ChannelRef>,
}

/// An inclusive span of message ids.
///
/// `start_id == 0` marks a span that was never populated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRange {
    /// First id.
    #[serde(default)]
    pub start_id: i32,
    /// Last id.
    #[serde(default)]
    pub end_id: i32,
}

impl IdRange {
    /// Build a range.
    #[must_use]
    pub const fn new(start_id: i32, end_id: i32) -> Self {
        Self { start_id, end_id }
    }

    /// Keep only the first and last id of a list (`0` when empty).
    #[must_use]
    pub fn bounds_of(ids: &[i32]) -> Self {
        Self {
            start_id: ids.first().copied().unwrap_or(0),
            end_id: ids.last().copied().unwrap_or(0),
        }
    }

    /// Ids covered by the range, empty if it was never populated.
    #[must_use]
    pub fn ids(&self) -> RangeInclusive<i32> {
        if self.start_id <= 0 {
            1..=0
        } else {
            self.start_id..=self.end_id
        }
    }
}

/// Last-run bookkeeping for the mirror cycle (`config` document).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDocument {
    /// Date of the last backup, `YYYY-MM-DD`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<String>,
    /// Ids copied out of the main channel by the last backup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_channel_range: Option<IdRange>,
    /// Matching ids created in the private channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_channel_range: Option<IdRange>,
    /// Span most recently removed from the main channel; resume watermark.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_main_range: Option<IdRange>,
}

/// A stored attach message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttachEntry {
    /// Message body.
    pub text: String,
    /// Telegram `MessageEntity` objects, kept verbatim.
    #[serde(default)]
    pub entities: Vec<Value>,
}

/// All attach entries keyed by token (`attach` document).
pub type AttachDocument = BTreeMap<String, AttachEntry>;

/// Permanent banner image (`image` document).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Platform-hosted file id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
}

/// Private image-hosting channel (`channel` document).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRecord {
    /// Channel chat id; `null` until linked.
    #[serde(default)]
    pub channel_id: Option<i64>,
}
