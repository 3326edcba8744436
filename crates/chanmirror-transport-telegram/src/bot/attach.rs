//! Attach bot: deep links to stored messages, banner upload and private
//! channel linking.

use super::{get_user_id_safe, reply_or_report, Response, REFUSAL};
use crate::gateway::entities_to_values;
use anyhow::Result;
use chanmirror_core::attach::{deep_link, AttachError, AttachService, Delivery, TOKEN_PREFIX};
use chanmirror_core::config::ATTACH_MESSAGE_TTL_SECS;
use chanmirror_core::documents::ChannelRef;
use chanmirror_core::gateway::{CommandSpec, MessagingGateway};
use chanmirror_core::session::{PendingInput, SessionStore};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Reply for an unknown or malformed token.
pub const NOT_FOUND_REPLY: &str = "❌ Message not found or expired.";

const ATTACH_REFUSAL: &str =
    "🛑 Who the hell invited you here? This bot is <b>NOT</b> your playground, loser.";
const UPLOAD_REFUSAL: &str =
    "🚫 Sorry, only <b>admins</b> can upload images here. Go cry to your mom.";
const NO_PRIVATE_CHANNEL: &str = "⚠️ Set the private channel first with /privatechannel";

/// Attach bot commands
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Attach bot commands:")]
pub enum AttachCommand {
    /// Store the next text message behind a deep link
    #[command(description = "📎 [Attach Message]")]
    Attach,
    /// Use the next photo as the permanent banner
    #[command(description = "🖼 [Set Permanent Image]")]
    UploadImage,
    /// Link the image-hosting channel from a forwarded message
    #[command(description = "🔒 [Set Private Channel]")]
    PrivateChannel,
    /// Greeting, or delivery when the payload is a token
    #[command(description = "🚀 [Start / View Attached Message]")]
    Start(String),
}

/// Command menu entries registered at startup.
#[must_use]
pub fn attach_command_specs() -> Vec<CommandSpec> {
    AttachCommand::bot_commands()
        .into_iter()
        .map(|c| CommandSpec::new(c.command.trim_start_matches('/'), c.description))
        .collect()
}

/// The parts of an incoming message the attach flows look at.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncomingMessage {
    /// Text body.
    pub text: Option<String>,
    /// Formatting entities of the text, as stored JSON.
    pub entities: Vec<Value>,
    /// Chat a forwarded message came from.
    pub forwarded_chat: Option<i64>,
    /// File id of the largest photo size.
    pub photo_file_id: Option<String>,
}

impl IncomingMessage {
    /// Extract the relevant parts of a Telegram message.
    #[must_use]
    pub fn from_message(msg: &Message) -> Self {
        Self {
            text: msg.text().map(str::to_string),
            entities: msg.entities().map(entities_to_values).unwrap_or_default(),
            forwarded_chat: msg.forward_from_chat().map(|chat| chat.id.0),
            photo_file_id: msg
                .photo()
                .and_then(<[_]>::last)
                .map(|size| size.file.id.to_string()),
        }
    }

    fn is_command(&self) -> bool {
        self.text.as_deref().is_some_and(|t| t.starts_with('/'))
    }
}

/// Attach bot state shared by all handlers.
pub struct AttachBot {
    service: AttachService,
    gateway: Arc<dyn MessagingGateway>,
    sessions: Arc<dyn SessionStore>,
    admins: HashSet<i64>,
    bot_username: String,
    session_ttl: Duration,
}

impl AttachBot {
    /// Create the bot state.
    #[must_use]
    pub fn new(
        service: AttachService,
        gateway: Arc<dyn MessagingGateway>,
        sessions: Arc<dyn SessionStore>,
        admins: HashSet<i64>,
        bot_username: impl Into<String>,
        session_ttl: Duration,
    ) -> Self {
        Self {
            service,
            gateway,
            sessions,
            admins,
            bot_username: bot_username.into(),
            session_ttl,
        }
    }

    /// Whether `user_id` is on the allow-list.
    #[must_use]
    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admins.contains(&user_id)
    }

    /// Run a command for `user_id` in `chat_id`.
    ///
    /// # Errors
    ///
    /// Returns store or send failures.
    pub async fn execute(
        &self,
        user_id: i64,
        chat_id: i64,
        first_name: &str,
        cmd: AttachCommand,
    ) -> Result<Response> {
        let input = match cmd {
            AttachCommand::Start(payload) => return self.start(chat_id, first_name, &payload).await,
            AttachCommand::Attach => PendingInput::AttachText,
            AttachCommand::UploadImage => PendingInput::UploadImage,
            AttachCommand::PrivateChannel => PendingInput::PrivateChannel,
        };
        Ok(self.arm_flow(user_id, input).await)
    }

    async fn arm_flow(&self, user_id: i64, input: PendingInput) -> Response {
        let (refusal, prompt) = match input {
            PendingInput::AttachText => (
                Response::html(ATTACH_REFUSAL),
                Response::text("📝 Send the message to attach (with formatting)."),
            ),
            PendingInput::UploadImage => (
                Response::html(UPLOAD_REFUSAL),
                Response::html("📸 Now send the image you want to use as <b>permanent banner</b>."),
            ),
            PendingInput::PrivateChannel | PendingInput::ForwardChannel => (
                Response::text(REFUSAL),
                Response::html("📨 Please forward <b>any message</b> from your private channel now."),
            ),
        };
        if !self.is_admin(user_id) {
            warn!(user_id, "Refused attach command from non-admin");
            return refusal;
        }
        self.sessions.arm(user_id, input, self.session_ttl).await;
        prompt
    }

    /// `/start [payload]`: deliver a token or greet.
    ///
    /// # Errors
    ///
    /// Returns store or send failures.
    pub async fn start(&self, chat_id: i64, first_name: &str, payload: &str) -> Result<Response> {
        let payload = payload.trim();
        if !payload.starts_with(TOKEN_PREFIX) {
            return Ok(Response::html(greeting(first_name)));
        }
        match self.service.deliver(&ChannelRef::Id(chat_id), payload).await? {
            Delivery::NotFound => Ok(Response::text(NOT_FOUND_REPLY)),
            delivered @ (Delivery::Photo(message_id) | Delivery::Text(message_id)) => {
                info!(token = payload, ?delivered, "Attach entry delivered");
                self.schedule_deletion(chat_id, message_id);
                Ok(Response::Delivered(message_id))
            }
        }
    }

    /// Delete a delivered message once its lifetime is over, ignoring errors.
    pub fn schedule_deletion(&self, chat_id: i64, message_id: i32) -> JoinHandle<()> {
        let gateway = Arc::clone(&self.gateway);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(ATTACH_MESSAGE_TTL_SECS)).await;
            if let Err(e) = gateway
                .delete_message(&ChannelRef::Id(chat_id), message_id)
                .await
            {
                debug!(chat_id, message_id, error = %e.description(), "Auto delete failed");
            }
        })
    }

    /// Handle a non-command message for the user's pending flow.
    ///
    /// A flow command that failed to parse (`/attach extra`) re-arms its
    /// flow; any other `/` text is never consumed as input. `now_ms` becomes
    /// the token of a new attach entry.
    ///
    /// # Errors
    ///
    /// Returns store or send failures.
    pub async fn on_message(
        &self,
        user_id: i64,
        incoming: IncomingMessage,
        now_ms: i64,
    ) -> Result<Response> {
        let pending = self.sessions.current(user_id).await;
        if !self.is_admin(user_id) {
            if incoming.is_command() || pending.is_some() {
                return Ok(Response::text(REFUSAL));
            }
            return Ok(Response::Nothing);
        }
        if let Some(input) = incoming.text.as_deref().and_then(flow_command) {
            return Ok(self.arm_flow(user_id, input).await);
        }
        if incoming.is_command() {
            return Ok(Response::Nothing);
        }

        match (pending, incoming) {
            (
                Some(PendingInput::PrivateChannel),
                IncomingMessage {
                    forwarded_chat: Some(channel_id),
                    ..
                },
            ) => {
                self.service.set_private_channel(channel_id).await?;
                self.sessions.clear(user_id).await;
                Ok(Response::html(format!(
                    "✅ Private Channel ID saved: <code>{channel_id}</code>"
                )))
            }
            (
                Some(PendingInput::UploadImage),
                IncomingMessage {
                    photo_file_id: Some(file_id),
                    ..
                },
            ) => match self.service.store_banner(&file_id).await {
                Ok(_) => {
                    self.sessions.clear(user_id).await;
                    Ok(Response::text("✅ Image saved permanently in private channel!"))
                }
                Err(AttachError::NoPrivateChannel) => Ok(Response::text(NO_PRIVATE_CHANNEL)),
                Err(e) => Err(e.into()),
            },
            (
                Some(PendingInput::AttachText),
                IncomingMessage {
                    text: Some(text),
                    entities,
                    ..
                },
            ) => {
                let token = self.service.create(&text, entities, now_ms).await?;
                let link = deep_link(&self.bot_username, &token);
                self.sessions.clear(user_id).await;
                Ok(Response::text(format!("✅ Message saved!\n\n🔗 Link: {link}")))
            }
            _ => Ok(Response::Nothing),
        }
    }
}

/// Flow started by a command word, ignoring arguments and a `@bot` suffix.
fn flow_command(text: &str) -> Option<PendingInput> {
    let word = text.strip_prefix('/')?.split_whitespace().next()?;
    let name = word.split_once('@').map_or(word, |(name, _)| name);
    match name.to_ascii_lowercase().as_str() {
        "attach" => Some(PendingInput::AttachText),
        "uploadimage" => Some(PendingInput::UploadImage),
        "privatechannel" => Some(PendingInput::PrivateChannel),
        _ => None,
    }
}

fn greeting(first_name: &str) -> String {
    format!(
        "👋 <b>Hi</b> <b>{}</b>!\n\n<b>I'm DD4K's Twins Attach Message Bot</b> 🤖\n\n\
         <b>Use /attach to create special link.</b>\n<b>Use /uploadimage to set permanent image.</b>\n\n\
         <b>But not for YOU 🤣</b>",
        html_escape::encode_text(first_name)
    )
}

/// Dispatch tree of the attach bot.
#[must_use]
pub fn attach_handler() -> UpdateHandler<teloxide::RequestError> {
    Update::filter_message()
        .branch(
            dptree::entry()
                .filter_command::<AttachCommand>()
                .endpoint(handle_command),
        )
        .branch(dptree::endpoint(handle_message))
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: AttachCommand,
    ctx: Arc<AttachBot>,
) -> Result<(), teloxide::RequestError> {
    let user_id = get_user_id_safe(&msg);
    let first_name = msg
        .from
        .as_ref()
        .map(|u| u.first_name.clone())
        .unwrap_or_default();
    let result = ctx.execute(user_id, msg.chat.id.0, &first_name, cmd).await;
    reply_or_report(&bot, msg.chat.id, result).await;
    respond(())
}

async fn handle_message(
    bot: Bot,
    msg: Message,
    ctx: Arc<AttachBot>,
) -> Result<(), teloxide::RequestError> {
    let user_id = get_user_id_safe(&msg);
    let incoming = IncomingMessage::from_message(&msg);
    let now_ms = chrono::Utc::now().timestamp_millis();
    let result = ctx.on_message(user_id, incoming, now_ms).await;
    reply_or_report(&bot, msg.chat.id, result).await;
    respond(())
}
