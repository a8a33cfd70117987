use std::sync::Arc;

use teloxide::{prelude::*, types::ParseMode};

use ltb_core::settings::SettingKey;

use crate::{router::AppState, with_retry};

use super::{
    commands::{render_status, usage_hint},
    escape_md, user_id_of,
};

/// What a settings-keyboard button asks for.
#[derive(Debug, PartialEq, Eq)]
enum ButtonAction {
    Hint(SettingKey),
    ShowConfig,
    Unknown,
}

fn parse_button(data: &str) -> ButtonAction {
    match data {
        "config_api_key" => ButtonAction::Hint(SettingKey::ApiKey),
        "config_base_url" => ButtonAction::Hint(SettingKey::BaseUrl),
        "config_model" => ButtonAction::Hint(SettingKey::ModelName),
        "config_prompt" => ButtonAction::Hint(SettingKey::SystemPrompt),
        "show_config" => ButtonAction::ShowConfig,
        _ => ButtonAction::Unknown,
    }
}

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    // Always answer so the client stops its spinner.
    if let Err(e) = bot.answer_callback_query(q.id.clone()).await {
        tracing::debug!(error = %e, "answer_callback_query failed");
    }

    let Some(message) = q.message.as_ref() else {
        return Ok(());
    };
    let data = q.data.as_deref().unwrap_or_default();
    let user_id = user_id_of(&q.from);

    let text = match parse_button(data) {
        ButtonAction::Hint(key) => usage_hint(key).to_string(),
        ButtonAction::ShowConfig => match state.settings.get_user_settings(user_id).await {
            Ok(settings) => render_status(&settings),
            Err(e) => {
                tracing::error!(%user_id, error = %e, "failed to load settings");
                "❌ Could not load your configuration. Please try again.".to_string()
            }
        },
        ButtonAction::Unknown => {
            tracing::debug!(%user_id, data, "unknown callback data");
            "❓ Unknown option.".to_string()
        }
    };

    let escaped = escape_md(&text);
    let edited = with_retry(|| {
        bot.edit_message_text(message.chat.id, message.id, escaped.clone())
            .parse_mode(ParseMode::MarkdownV2)
    })
    .await;
    if let Err(e) = edited {
        tracing::warn!(%user_id, error = %e, "failed to edit settings message");
    }

    Ok(())
}
