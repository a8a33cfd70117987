use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, ParseMode},
};

use ltb_core::{
    security::{Guard, RequestContext},
    settings::{SettingKey, UserSettings},
};

use crate::{router::AppState, with_retry};

use super::{escape_md, reply_md, user_id_of};

pub(crate) const WELCOME: &str = "🤖 Welcome! I relay your messages and photos to an \
OpenAI-compatible model using your own credentials.\n\n\
Set an API key and a model name to get started, then just send a message. \
Use the buttons below or the commands in the menu.";

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

/// Value a `/set_*` command stores: the whole argument string for the system
/// prompt, the first word for every other key.
fn setting_value(key: SettingKey, args: &str) -> Option<String> {
    let value = match key {
        SettingKey::SystemPrompt => args.split_whitespace().collect::<Vec<_>>().join(" "),
        _ => args.split_whitespace().next().unwrap_or("").to_string(),
    };
    (!value.is_empty()).then_some(value)
}

pub(crate) fn usage_hint(key: SettingKey) -> &'static str {
    match key {
        SettingKey::ApiKey => "🔑 Use: /set_api_key YOUR_API_KEY",
        SettingKey::BaseUrl => "🌐 Use: /set_base_url https://api.openai.com/v1",
        SettingKey::ModelName => "🤖 Use: /set_model gpt-4o",
        SettingKey::SystemPrompt => "📝 Use: /set_system_prompt You are a helpful assistant",
    }
}

fn saved_reply(key: SettingKey) -> &'static str {
    match key {
        SettingKey::ApiKey => "✅ API key saved.",
        SettingKey::BaseUrl => "✅ Base URL saved.",
        SettingKey::ModelName => "✅ Model saved.",
        SettingKey::SystemPrompt => "✅ System prompt saved.",
    }
}

fn setting_label(key: SettingKey) -> &'static str {
    match key {
        SettingKey::ApiKey => "API key",
        SettingKey::BaseUrl => "Base URL",
        SettingKey::ModelName => "Model",
        SettingKey::SystemPrompt => "System prompt",
    }
}

/// Plain-text status report. The API key is only ever reported as set or unset.
pub(crate) fn render_status(settings: &UserSettings) -> String {
    if settings.is_empty() {
        return "⚠️ No configuration saved yet.".to_string();
    }
    let lines: Vec<String> = SettingKey::ALL
        .into_iter()
        .map(|key| {
            let shown = match (key, settings.get(key)) {
                (SettingKey::ApiKey, Some(_)) => "✅ Configured",
                (SettingKey::ApiKey, None) => "❌ Not configured",
                (_, Some(value)) => value,
                (_, None) => "Not configured",
            };
            format!("• {}: {shown}", setting_label(key))
        })
        .collect();
    format!("🔍 Current configuration:\n\n{}", lines.join("\n"))
}

pub(crate) fn config_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            InlineKeyboardButton::callback("🔑 API key", "config_api_key"),
            InlineKeyboardButton::callback("🌐 Base URL", "config_base_url"),
        ],
        vec![
            InlineKeyboardButton::callback("🤖 Model", "config_model"),
            InlineKeyboardButton::callback("📝 System prompt", "config_prompt"),
        ],
        vec![InlineKeyboardButton::callback("🔍 Show configuration", "show_config")],
    ])
}

/// Whether the message carries a secret that must not stay in the chat,
/// whatever happens to the command itself.
fn carries_secret(cmd: &str, args: &str) -> bool {
    setting_for_command(cmd) == Some(SettingKey::ApiKey) && !args.trim().is_empty()
}

fn setting_for_command(cmd: &str) -> Option<SettingKey> {
    match cmd {
        "set_api_key" => Some(SettingKey::ApiKey),
        "set_base_url" => Some(SettingKey::BaseUrl),
        "set_model" => Some(SettingKey::ModelName),
        "set_system_prompt" => Some(SettingKey::SystemPrompt),
        _ => None,
    }
}

pub async fn handle_command(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let user_id = user_id_of(user);
    let chat_id = msg.chat.id;
    let text = msg.text().unwrap_or("");
    let (cmd, args) = parse_command(text);

    if carries_secret(&cmd, &args) {
        // Keep the key out of the chat history, even if the command is rejected below.
        if let Err(e) = bot.delete_message(chat_id, msg.id).await {
            tracing::debug!(%user_id, error = %e, "could not delete the api key message");
        }
    }

    let ctx = RequestContext::command(user_id, text);
    if let Some(violation) = state.command_guard.check(&ctx) {
        tracing::info!(%user_id, command = %cmd, "command rejected by guard");
        reply_md(&bot, chat_id, &violation).await;
        return Ok(());
    }

    if let Some(key) = setting_for_command(&cmd) {
        let Some(value) = setting_value(key, &args) else {
            reply_md(&bot, chat_id, usage_hint(key)).await;
            return Ok(());
        };

        match state.settings.set_user_setting(user_id, key, &value).await {
            Ok(()) => {
                tracing::info!(%user_id, %key, "setting updated");
                reply_md(&bot, chat_id, saved_reply(key)).await;
            }
            Err(e) => {
                tracing::error!(%user_id, %key, error = %e, "failed to save setting");
                reply_md(&bot, chat_id, "❌ Could not save the setting. Please try again.").await;
            }
        }
        return Ok(());
    }

    match cmd.as_str() {
        "start" | "help" => {
            let sent = with_retry(|| {
                bot.send_message(chat_id, escape_md(WELCOME))
                    .parse_mode(ParseMode::MarkdownV2)
                    .reply_markup(config_keyboard())
            })
            .await;
            if let Err(e) = sent {
                tracing::warn!(%user_id, error = %e, "failed to send welcome");
            }
        }
        "config_status" => {
            let status = match state.settings.get_user_settings(user_id).await {
                Ok(settings) => render_status(&settings),
                Err(e) => {
                    tracing::error!(%user_id, error = %e, "failed to load settings");
                    "❌ Could not load your configuration. Please try again.".to_string()
                }
            };
            reply_md(&bot, chat_id, &status).await;
        }
        _ => {
            reply_md(&bot, chat_id, &format!("Unknown command: /{cmd}")).await;
        }
    }

    Ok(())
}
