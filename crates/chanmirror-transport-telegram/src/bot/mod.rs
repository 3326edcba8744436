/// Admin bot commands, menu and forward capture
pub mod admin;
/// Attach bot commands and message flows
pub mod attach;
/// Resilient messaging with automatic retry for Telegram API operations
pub mod resilient;

use resilient::send_message_resilient;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, ParseMode};
use tracing::error;

/// Generic refusal for users outside the allow-list.
pub const REFUSAL: &str = "😤 You're not allowed here. Even your brain isn't allowed in public.";

/// What a handler wants sent back to the chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Plain text reply.
    Text(String),
    /// Reply formatted as Telegram HTML.
    Html(String),
    /// The admin menu keyboard.
    Menu,
    /// An attach entry was delivered as this message id.
    Delivered(i32),
    /// Nothing to send.
    Nothing,
}

impl Response {
    /// Plain text reply.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// HTML reply.
    pub fn html(text: impl Into<String>) -> Self {
        Self::Html(text.into())
    }
}

/// Safe extraction of user ID from a message.
/// Returns 0 if the user information is missing.
#[must_use]
pub fn get_user_id_safe(msg: &Message) -> i64 {
    msg.from.as_ref().map_or(0, |u| u.id.0.cast_signed())
}

/// Inline keyboard of the admin menu.
#[must_use]
pub fn admin_menu_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback(
            "Set Static Message",
            admin::CALLBACK_SET_STATIC,
        )],
        vec![InlineKeyboardButton::callback(
            "Set Forward Channel",
            admin::CALLBACK_SET_FORWARD,
        )],
    ])
}

/// Send a handler response to a chat.
///
/// `Delivered` and `Nothing` send nothing.
///
/// # Errors
///
/// Returns an error if the reply fails after retries.
pub async fn send_response(bot: &Bot, chat_id: ChatId, response: Response) -> anyhow::Result<()> {
    match response {
        Response::Text(text) => {
            send_message_resilient(bot, chat_id, text, None, None).await?;
        }
        Response::Html(text) => {
            send_message_resilient(bot, chat_id, text, Some(ParseMode::Html), None).await?;
        }
        Response::Menu => {
            send_message_resilient(bot, chat_id, "📋 Admin Menu", None, Some(admin_menu_keyboard()))
                .await?;
        }
        Response::Delivered(_) | Response::Nothing => {}
    }
    Ok(())
}

/// Send a handler result; a failure is logged and reported to the chat.
pub(crate) async fn reply_or_report(bot: &Bot, chat_id: ChatId, result: anyhow::Result<Response>) {
    let response = result.unwrap_or_else(|e| {
        error!("Handler error: {e:#}");
        Response::text(format!("❌ {e}"))
    });
    if let Err(e) = send_response(bot, chat_id, response).await {
        error!("Failed to reply to {chat_id}: {e:#}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teloxide::types::InlineKeyboardButtonKind;

    #[test]
    fn test_menu_callbacks() {
        let data: Vec<String> = admin_menu_keyboard()
            .inline_keyboard
            .iter()
            .flatten()
            .filter_map(|button| match &button.kind {
                InlineKeyboardButtonKind::CallbackData(data) => Some(data.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(data, vec!["set_static", "set_forward"]);
    }
}
