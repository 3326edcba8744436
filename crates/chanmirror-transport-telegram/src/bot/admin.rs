//! Admin bot: static anchor, forward channel capture and copy test.

use super::{get_user_id_safe, reply_or_report, Response, REFUSAL};
use anyhow::Result;
use chanmirror_core::admin::{AdminError, AdminService};
use chanmirror_core::config::FORWARD_CAPTURE_TTL_SECS;
use chanmirror_core::documents::ChannelRef;
use chanmirror_core::gateway::CommandSpec;
use chanmirror_core::session::{PendingInput, SessionStore};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use teloxide::utils::command::BotCommands;
use tracing::{info, warn};

/// Callback data of the "Set Static Message" menu button.
pub const CALLBACK_SET_STATIC: &str = "set_static";
/// Callback data of the "Set Forward Channel" menu button.
pub const CALLBACK_SET_FORWARD: &str = "set_forward";

const WELCOME: &str = "👋 DD4K Admin Bot\n\n/setstaticmessage\n/setforwardchannel\n/testcopy";
const STATIC_USAGE: &str = "⚠️ Send: /setstaticmessage <link>";
const STATIC_MENU_HINT: &str =
    "⚠️ Send: /setstaticmessage <link>\nor reply to the static post with /setstaticmessage";
const FORWARD_PROMPT: &str = "📥 Now forward a message from your private channel";

/// Admin bot commands
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Admin commands:")]
pub enum AdminCommand {
    /// Show the command list
    #[command(description = "🚀 Start")]
    Start,
    /// Show the inline admin menu
    #[command(description = "📋 Admin menu")]
    Menu,
    /// Set the static anchor from a reply or a post link
    #[command(description = "📌 Set static message")]
    SetStaticMessage(String),
    /// Arm forward-channel capture
    #[command(description = "📥 Set forward channel")]
    SetForwardChannel,
    /// Copy the static anchor here once
    #[command(description = "🧪 Test copy")]
    TestCopy,
}

/// Command menu entries registered at startup.
#[must_use]
pub fn admin_command_specs() -> Vec<CommandSpec> {
    AdminCommand::bot_commands()
        .into_iter()
        .map(|c| CommandSpec::new(c.command.trim_start_matches('/'), c.description))
        .collect()
}

/// Admin bot state shared by all handlers.
pub struct AdminBot {
    service: AdminService,
    sessions: Arc<dyn SessionStore>,
    admins: HashSet<i64>,
    capture_ttl: Duration,
}

impl AdminBot {
    /// Create the bot state.
    #[must_use]
    pub fn new(
        service: AdminService,
        sessions: Arc<dyn SessionStore>,
        admins: HashSet<i64>,
    ) -> Self {
        Self {
            service,
            sessions,
            admins,
            capture_ttl: Duration::from_secs(FORWARD_CAPTURE_TTL_SECS),
        }
    }

    /// Replace the lifetime of an armed forward capture.
    #[must_use]
    pub fn with_capture_ttl(mut self, ttl: Duration) -> Self {
        self.capture_ttl = ttl;
        self
    }

    /// Whether `user_id` is on the allow-list.
    #[must_use]
    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admins.contains(&user_id)
    }

    /// Run a command for `user_id` issued in `chat_id`.
    ///
    /// `reply_to` is the id of the message the command replied to.
    ///
    /// # Errors
    ///
    /// Returns store failures.
    pub async fn execute(
        &self,
        user_id: i64,
        chat_id: i64,
        reply_to: Option<i32>,
        cmd: AdminCommand,
    ) -> Result<Response> {
        if !self.is_admin(user_id) {
            warn!(user_id, "Refused admin command from non-admin");
            return Ok(Response::text(REFUSAL));
        }
        let response = match cmd {
            AdminCommand::Start => Response::text(WELCOME),
            AdminCommand::Menu => Response::Menu,
            AdminCommand::SetStaticMessage(args) => {
                self.set_static(chat_id, reply_to, &args).await?
            }
            AdminCommand::SetForwardChannel => self.arm_capture(user_id).await,
            AdminCommand::TestCopy => {
                match self.service.test_copy(&ChannelRef::Id(chat_id)).await {
                    Ok(_) => Response::text("✅ Copy test success."),
                    Err(e) => Response::text(format!("❌ Copy failed: {e}")),
                }
            }
        };
        Ok(response)
    }

    async fn set_static(&self, chat_id: i64, reply_to: Option<i32>, args: &str) -> Result<Response> {
        if let Some(message_id) = reply_to {
            self.service
                .set_static_from_reply(ChannelRef::Id(chat_id), message_id)
                .await?;
            return Ok(Response::text("✅ Static message set from reply"));
        }
        match self.service.set_static_from_link(args).await {
            Ok(_) => Ok(Response::text("✅ Static message set from link")),
            Err(AdminError::MissingLink) => Ok(Response::text(STATIC_USAGE)),
            Err(AdminError::InvalidLink) => Ok(Response::text("❌ Invalid link format")),
            Err(e) => Err(e.into()),
        }
    }

    async fn arm_capture(&self, user_id: i64) -> Response {
        self.sessions
            .arm(user_id, PendingInput::ForwardChannel, self.capture_ttl)
            .await;
        info!(user_id, "Forward channel capture armed");
        Response::text(FORWARD_PROMPT)
    }

    /// Handle an inline menu button.
    pub async fn on_callback(&self, user_id: i64, data: &str) -> Response {
        if !self.is_admin(user_id) {
            return Response::text(REFUSAL);
        }
        match data {
            CALLBACK_SET_STATIC => Response::text(STATIC_MENU_HINT),
            CALLBACK_SET_FORWARD => self.arm_capture(user_id).await,
            _ => Response::Nothing,
        }
    }

    /// Handle a non-command message. Only an armed capture reacts.
    ///
    /// `origin_chat` is the chat a forwarded message came from, if any.
    ///
    /// # Errors
    ///
    /// Returns store failures.
    pub async fn on_message(&self, user_id: i64, origin_chat: Option<i64>) -> Result<Response> {
        if self.sessions.current(user_id).await != Some(PendingInput::ForwardChannel) {
            return Ok(Response::Nothing);
        }
        let Some(chat_id) = origin_chat else {
            return Ok(Response::text("❌ Invalid forward"));
        };
        self.service.set_forward_channel(chat_id).await?;
        self.sessions.clear(user_id).await;
        Ok(Response::text("✅ Forward channel saved"))
    }
}

/// Dispatch tree of the admin bot.
#[must_use]
pub fn admin_handler() -> UpdateHandler<teloxide::RequestError> {
    dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handle_callback))
        .branch(
            Update::filter_message()
                .branch(
                    dptree::entry()
                        .filter_command::<AdminCommand>()
                        .endpoint(handle_command),
                )
                .branch(dptree::endpoint(handle_message)),
        )
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: AdminCommand,
    ctx: Arc<AdminBot>,
) -> Result<(), teloxide::RequestError> {
    let user_id = get_user_id_safe(&msg);
    let reply_to = msg.reply_to_message().map(|reply| reply.id.0);
    let result = ctx.execute(user_id, msg.chat.id.0, reply_to, cmd).await;
    reply_or_report(&bot, msg.chat.id, result).await;
    respond(())
}

async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    ctx: Arc<AdminBot>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = bot.answer_callback_query(q.id.clone()).await {
        warn!("Failed to answer callback query: {e}");
    }
    let user_id = q.from.id.0.cast_signed();
    let response = ctx
        .on_callback(user_id, q.data.as_deref().unwrap_or_default())
        .await;
    reply_or_report(&bot, ChatId::from(q.from.id), Ok(response)).await;
    respond(())
}

async fn handle_message(
    bot: Bot,
    msg: Message,
    ctx: Arc<AdminBot>,
) -> Result<(), teloxide::RequestError> {
    let user_id = get_user_id_safe(&msg);
    let origin = msg
        .forward_from_chat()
        .or(msg.sender_chat.as_ref())
        .map(|chat| chat.id.0);
    let result = ctx.on_message(user_id, origin).await;
    reply_or_report(&bot, msg.chat.id, result).await;
    respond(())
}
