//! [`MessagingGateway`] backed by a teloxide [`Bot`].
//!
//! Every error goes through [`classify`] so retry decisions depend on the
//! Telegram description text only.

use async_trait::async_trait;
use chanmirror_core::documents::ChannelRef;
use chanmirror_core::gateway::{classify, CommandSpec, GatewayError, MessagingGateway, SentPhoto};
use serde_json::Value;
use teloxide::prelude::*;
use teloxide::types::{BotCommand, FileId, InputFile, MessageEntity, MessageId, Recipient};
use teloxide::RequestError;
use tracing::warn;

/// Classify a teloxide request error.
///
/// Flood control is rendered as `"Too Many Requests: retry after N"` and API
/// errors by their Telegram description before classification.
#[must_use]
pub fn classify_request_error(err: &RequestError) -> GatewayError {
    match err {
        RequestError::RetryAfter(wait) => classify(&format!(
            "Too Many Requests: retry after {}",
            wait.duration().as_secs()
        )),
        other => classify(&other.to_string()),
    }
}

/// Chat reference as a teloxide recipient.
#[must_use]
pub fn recipient(chat: &ChannelRef) -> Recipient {
    match chat {
        ChannelRef::Id(id) => Recipient::Id(ChatId(*id)),
        ChannelRef::Username(name) => Recipient::ChannelUsername(name.clone()),
    }
}

/// Serialize message entities for storage.
#[must_use]
pub fn entities_to_values(entities: &[MessageEntity]) -> Vec<Value> {
    entities
        .iter()
        .filter_map(|e| serde_json::to_value(e).ok())
        .collect()
}

/// Decode stored entities. Undecodable input yields no formatting.
#[must_use]
pub fn values_to_entities(values: &[Value]) -> Vec<MessageEntity> {
    serde_json::from_value(Value::Array(values.to_vec())).unwrap_or_else(|e| {
        warn!(error = %e, "Dropping undecodable message entities");
        Vec::new()
    })
}

/// Telegram Bot API gateway. One attempt per call.
#[derive(Clone)]
pub struct TelegramGateway {
    bot: Bot,
}

impl TelegramGateway {
    /// Wrap a bot.
    #[must_use]
    pub const fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl MessagingGateway for TelegramGateway {
    async fn copy_message(
        &self,
        to: &ChannelRef,
        from: &ChannelRef,
        message_id: i32,
    ) -> Result<i32, GatewayError> {
        self.bot
            .copy_message(recipient(to), recipient(from), MessageId(message_id))
            .await
            .map(|id| id.0)
            .map_err(|e| classify_request_error(&e))
    }

    async fn forward_message(
        &self,
        to: &ChannelRef,
        from: &ChannelRef,
        message_id: i32,
    ) -> Result<i32, GatewayError> {
        self.bot
            .forward_message(recipient(to), recipient(from), MessageId(message_id))
            .await
            .map(|msg| msg.id.0)
            .map_err(|e| classify_request_error(&e))
    }

    async fn delete_message(&self, chat: &ChannelRef, message_id: i32) -> Result<(), GatewayError> {
        self.bot
            .delete_message(recipient(chat), MessageId(message_id))
            .await
            .map(|_| ())
            .map_err(|e| classify_request_error(&e))
    }

    async fn send_text(
        &self,
        chat: &ChannelRef,
        text: &str,
        entities: &[Value],
    ) -> Result<i32, GatewayError> {
        let mut req = self.bot.send_message(recipient(chat), text);
        if !entities.is_empty() {
            req = req.entities(values_to_entities(entities));
        }
        req.await
            .map(|msg| msg.id.0)
            .map_err(|e| classify_request_error(&e))
    }

    async fn send_photo(
        &self,
        chat: &ChannelRef,
        file_id: &str,
        caption: &str,
        caption_entities: &[Value],
    ) -> Result<SentPhoto, GatewayError> {
        let photo = InputFile::file_id(FileId(file_id.to_string()));
        let mut req = self.bot.send_photo(recipient(chat), photo).caption(caption);
        if !caption_entities.is_empty() {
            req = req.caption_entities(values_to_entities(caption_entities));
        }
        let msg = req.await.map_err(|e| classify_request_error(&e))?;
        let stored = msg
            .photo()
            .and_then(<[_]>::last)
            .map(|size| size.file.id.to_string())
            .ok_or_else(|| GatewayError::other("sent message carries no photo"))?;
        Ok(SentPhoto {
            message_id: msg.id.0,
            file_id: stored,
        })
    }

    async fn check_chat(&self, chat: &ChannelRef) -> Result<(), GatewayError> {
        self.bot
            .get_chat(recipient(chat))
            .await
            .map(|_| ())
            .map_err(|e| classify_request_error(&e))
    }

    async fn set_commands(&self, commands: &[CommandSpec]) -> Result<(), GatewayError> {
        let commands: Vec<BotCommand> = commands
            .iter()
            .map(|c| BotCommand::new(c.command.clone(), c.description.clone()))
            .collect();
        self.bot
            .set_my_commands(commands)
            .await
            .map(|_| ())
            .map_err(|e| classify_request_error(&e))
    }
}
