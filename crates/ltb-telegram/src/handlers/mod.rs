//! Telegram update handlers.
//!
//! Messages starting with `/` are configuration commands; everything else with
//! text or a photo is relayed to the model pipeline. Inline keyboard presses
//! arrive as callback queries.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message, ParseMode},
};

use ltb_core::{
    domain::UserId,
    security::{MarkdownEscapeSanitizer, Sanitizer},
};

use crate::{router::AppState, with_retry};

mod callback;
mod commands;
mod relay;

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    callback::handle_callback(bot, q, state).await
}

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    if let Some(text) = msg.text() {
        if text.starts_with('/') {
            return commands::handle_command(bot, msg, state).await;
        }
    }

    if msg.text().is_some() || msg.photo().is_some() {
        return relay::handle_relay(bot, msg, state).await;
    }

    tracing::debug!(chat_id = msg.chat.id.0, "ignoring unsupported message type");
    Ok(())
}

fn user_id_of(user: &teloxide::types::User) -> UserId {
    UserId(user.id.0 as i64)
}

/// Escapes `text` for MarkdownV2.
fn escape_md(text: &str) -> String {
    MarkdownEscapeSanitizer.sanitize(text)
}

/// Sends plain `text` escaped as MarkdownV2. Delivery failures are logged, not returned.
async fn reply_md(bot: &Bot, chat_id: ChatId, text: &str) {
    let escaped = escape_md(text);
    let sent = with_retry(|| {
        bot.send_message(chat_id, escaped.clone())
            .parse_mode(ParseMode::MarkdownV2)
    })
    .await;
    if let Err(e) = sent {
        tracing::warn!(chat_id = chat_id.0, error = %e, "failed to send reply");
    }
}

/// Sends plain text without a parse mode. Delivery failures are logged, not returned.
async fn reply_plain(bot: &Bot, chat_id: ChatId, text: &str) {
    if let Err(e) = with_retry(|| bot.send_message(chat_id, text.to_string())).await {
        tracing::warn!(chat_id = chat_id.0, error = %e, "failed to send reply");
    }
}
