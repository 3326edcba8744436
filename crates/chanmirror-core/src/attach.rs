//! Attach links: stored formatted text behind `msg_<millis>` tokens, sent
//! with the permanent banner image when one is configured.

use crate::documents::{AttachDocument, AttachEntry, ChannelRecord, ChannelRef, ImageRecord};
use crate::gateway::{GatewayError, MessagingGateway};
use crate::store::{load_or_default, save_document, DocumentKey, DocumentStore, StoreError};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Prefix of every attach token.
pub const TOKEN_PREFIX: &str = "msg_";
/// Caption of the banner copy kept in the private channel.
pub const BANNER_CAPTION: &str = "DD4K Permanent Image";

/// Build the bot deep link for a token.
#[must_use]
pub fn deep_link(bot_username: &str, token: &str) -> String {
    format!(
        "https://t.me/{}?start={token}",
        bot_username.trim_start_matches('@')
    )
}

/// How a token was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Sent as the banner photo with the text as caption.
    Photo(i32),
    /// Sent as plain formatted text.
    Text(i32),
    /// No entry for the token; nothing was sent.
    NotFound,
}

impl Delivery {
    /// Id of the sent message, if any.
    #[must_use]
    pub const fn message_id(self) -> Option<i32> {
        match self {
            Self::Photo(id) | Self::Text(id) => Some(id),
            Self::NotFound => None,
        }
    }
}

/// Attach flow failures
#[derive(Debug, Error)]
pub enum AttachError {
    /// The banner needs a private channel to live in
    #[error("private channel is not set")]
    NoPrivateChannel,
    /// Document store failure
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Platform failure
    #[error("{}", .0.description())]
    Gateway(#[from] GatewayError),
}

/// Stores and delivers attach entries.
pub struct AttachService {
    store: Arc<dyn DocumentStore>,
    gateway: Arc<dyn MessagingGateway>,
}

impl AttachService {
    /// Create the service.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, gateway: Arc<dyn MessagingGateway>) -> Self {
        Self { store, gateway }
    }

    /// Store `text` under a fresh token derived from `now_ms`.
    ///
    /// # Errors
    ///
    /// Returns an error if the attach document cannot be loaded or saved.
    pub async fn create(
        &self,
        text: &str,
        entities: Vec<Value>,
        now_ms: i64,
    ) -> Result<String, AttachError> {
        let token = format!("{TOKEN_PREFIX}{now_ms}");
        let mut doc: AttachDocument =
            load_or_default(self.store.as_ref(), DocumentKey::Attach).await?;
        doc.insert(
            token.clone(),
            AttachEntry {
                text: text.to_string(),
                entities,
            },
        );
        save_document(self.store.as_ref(), DocumentKey::Attach, &doc).await?;
        info!(token = %token, "Attach entry saved");
        Ok(token)
    }

    /// Send the entry behind `token` to `chat`.
    ///
    /// # Errors
    ///
    /// Returns store or send failures.
    pub async fn deliver(&self, chat: &ChannelRef, token: &str) -> Result<Delivery, AttachError> {
        if !token.starts_with(TOKEN_PREFIX) {
            return Ok(Delivery::NotFound);
        }
        let doc: AttachDocument = load_or_default(self.store.as_ref(), DocumentKey::Attach).await?;
        let Some(entry) = doc.get(token) else {
            info!(token, "Attach entry not found");
            return Ok(Delivery::NotFound);
        };

        let image: ImageRecord = load_or_default(self.store.as_ref(), DocumentKey::Image).await?;
        if let Some(file_id) = image.file_id.as_deref() {
            let sent = self
                .gateway
                .send_photo(chat, file_id, &entry.text, &entry.entities)
                .await?;
            return Ok(Delivery::Photo(sent.message_id));
        }
        let message_id = self
            .gateway
            .send_text(chat, &entry.text, &entry.entities)
            .await?;
        Ok(Delivery::Text(message_id))
    }

    /// Save the image-hosting channel id.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be saved.
    pub async fn set_private_channel(&self, channel_id: i64) -> Result<(), AttachError> {
        let record = ChannelRecord {
            channel_id: Some(channel_id),
        };
        save_document(self.store.as_ref(), DocumentKey::Channel, &record).await?;
        info!(channel_id, "Private channel saved");
        Ok(())
    }

    /// The image-hosting channel id, if set.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be loaded.
    pub async fn private_channel(&self) -> Result<Option<i64>, AttachError> {
        let record: ChannelRecord =
            load_or_default(self.store.as_ref(), DocumentKey::Channel).await?;
        Ok(record.channel_id)
    }

    /// Re-host a photo in the private channel and keep it as the banner.
    ///
    /// Returns the file id that was saved.
    ///
    /// # Errors
    ///
    /// Returns `NoPrivateChannel` before one is linked, or the send failure.
    pub async fn store_banner(&self, photo_file_id: &str) -> Result<String, AttachError> {
        let channel = self
            .private_channel()
            .await?
            .ok_or(AttachError::NoPrivateChannel)?;
        let sent = self
            .gateway
            .send_photo(&ChannelRef::Id(channel), photo_file_id, BANNER_CAPTION, &[])
            .await
            .inspect_err(|e| warn!(channel, error = %e.description(), "Banner upload failed"))?;
        let record = ImageRecord {
            file_id: Some(sent.file_id.clone()),
        };
        save_document(self.store.as_ref(), DocumentKey::Image, &record).await?;
        info!(channel, "Banner image saved");
        Ok(sent.file_id)
    }
}
