use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use teloxide::{net::Download, prelude::*, types::PhotoSize};

use ltb_core::{
    domain::UserId,
    errors::Error,
    pipeline::PipelineRequest,
    security::{Guard, RequestContext, Sanitizer},
};

use crate::{router::AppState, with_retry, MAX_MESSAGE_LEN};

use super::{reply_plain, user_id_of};

const IMAGE_ONLY_PROMPT: &str = "Describe the image";
const PROCESSING: &str = "⏳ Processing your request...";
const CONFIG_INCOMPLETE: &str = "⚠️ Your configuration is incomplete.\n\n\
Set an API key with /set_api_key and a model with /set_model, \
then check everything with /config_status.";
const GENERIC_FAILURE: &str = "⚠️ Something went wrong while processing your request. Please try again.";

static PHOTO_COUNTER: AtomicUsize = AtomicUsize::new(1);

/// A downloaded photo that is removed from disk when dropped.
struct TempImage {
    path: PathBuf,
}

impl TempImage {
    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempImage {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "temp image removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove temp image")
            }
        }
    }
}

/// Extension for a downloaded photo, taken from Telegram's file path when it
/// is a known image type.
fn photo_extension(file_path: &str) -> &'static str {
    let ext = Path::new(file_path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("jpeg") => "jpeg",
        Some("png") => "png",
        Some("webp") => "webp",
        _ => "jpg",
    }
}

async fn download_photo(
    bot: &Bot,
    temp_dir: &Path,
    user_id: UserId,
    photo: &PhotoSize,
) -> anyhow::Result<TempImage> {
    let file = bot.get_file(photo.file.id.clone()).await?;

    let ts = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let n = PHOTO_COUNTER.fetch_add(1, Ordering::SeqCst);
    let ext = photo_extension(&file.path);

    tokio::fs::create_dir_all(temp_dir).await?;
    let temp = TempImage {
        path: temp_dir.join(format!("photo_{user_id}_{ts}_{n}.{ext}")),
    };
    let mut dst = tokio::fs::File::create(temp.path()).await?;
    bot.download_file(&file.path, &mut dst).await?;

    Ok(temp)
}

/// What the user sees when the pipeline fails. Backend details stay in the logs.
fn failure_text(err: &Error) -> String {
    match err {
        Error::Config(msg) => format!("⚠️ {msg}"),
        Error::InvalidPath { .. } => "⚠️ The attached image could not be read.".to_string(),
        _ => GENERIC_FAILURE.to_string(),
    }
}

/// Length as Telegram counts it, in UTF-16 code units.
fn utf16_len(text: &str) -> usize {
    text.chars().map(char::len_utf16).sum()
}

/// Splits `text` into pieces of at most `max_units` UTF-16 code units,
/// preferring to break after a newline.
fn split_message(text: &str, max_units: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = text;
    while utf16_len(rest) > max_units {
        let mut units = 0usize;
        let mut hard = 0usize;
        for (i, ch) in rest.char_indices() {
            units += ch.len_utf16();
            if units > max_units {
                break;
            }
            hard = i + ch.len_utf8();
        }
        if hard == 0 {
            // A single char wider than the limit; emit it alone.
            hard = rest.chars().next().map(char::len_utf8).unwrap_or(rest.len());
        }
        let cut = match rest[..hard].rfind('\n') {
            Some(i) if i > 0 => i + 1,
            _ => hard,
        };
        out.push(rest[..cut].to_string());
        rest = &rest[cut..];
    }
    if !rest.is_empty() || out.is_empty() {
        out.push(rest.to_string());
    }
    out
}

/// Replaces the placeholder with the first chunk and sends the remainder as new messages.
async fn deliver(bot: &Bot, chat_id: ChatId, placeholder: Option<&Message>, text: &str) {
    let mut chunks = split_message(text, MAX_MESSAGE_LEN).into_iter();

    if let Some(ph) = placeholder {
        if let Some(first) = chunks.next() {
            let edited = with_retry(|| bot.edit_message_text(chat_id, ph.id, first.clone())).await;
            if let Err(e) = edited {
                tracing::warn!(chat_id = chat_id.0, error = %e, "failed to edit placeholder");
                reply_plain(bot, chat_id, &first).await;
            }
        }
    }

    for chunk in chunks {
        reply_plain(bot, chat_id, &chunk).await;
    }
}

pub async fn handle_relay(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let user_id = user_id_of(user);
    let chat_id = msg.chat.id;

    let settings = match state.settings.get_user_settings(user_id).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(%user_id, error = %e, "failed to load settings");
            reply_plain(&bot, chat_id, GENERIC_FAILURE).await;
            return Ok(());
        }
    };
    if !settings.is_ready() {
        reply_plain(&bot, chat_id, CONFIG_INCOMPLETE).await;
        return Ok(());
    }

    let raw = msg.text().or_else(|| msg.caption()).unwrap_or("");
    let mut text = state.sanitizer.sanitize(raw);
    let photo = msg.photo().and_then(|sizes| sizes.last());
    if text.is_empty() && photo.is_none() {
        return Ok(());
    }

    let ctx = RequestContext::message(user_id, text.clone())
        .with_image_size(photo.map(|p| u64::from(p.file.size)));
    if let Some(violation) = state.message_guard.check(&ctx) {
        tracing::info!(%user_id, "message rejected by guard");
        reply_plain(&bot, chat_id, &violation).await;
        return Ok(());
    }

    let image = match photo {
        Some(photo) => match download_photo(&bot, &state.cfg.temp_dir, user_id, photo).await {
            Ok(image) => Some(image),
            Err(e) => {
                tracing::warn!(%user_id, error = %e, "photo download failed");
                reply_plain(&bot, chat_id, "⚠️ Could not download the image. Please try again.")
                    .await;
                return Ok(());
            }
        },
        None => None,
    };
    if image.is_some() && text.is_empty() {
        text = IMAGE_ONLY_PROMPT.to_string();
    }

    let placeholder = match with_retry(|| bot.send_message(chat_id, PROCESSING)).await {
        Ok(m) => Some(m),
        Err(e) => {
            tracing::warn!(%user_id, error = %e, "failed to send placeholder");
            None
        }
    };

    let mut req = PipelineRequest::text(text);
    if let Some(image) = &image {
        req = req.with_image_path(image.path());
    }

    let reply = match state.pipeline.run(&settings, req).await {
        Ok(answer) => format!("🤖 Reply:\n\n{answer}"),
        Err(e) => {
            if e.is_user_actionable() {
                tracing::info!(%user_id, error = %e, "request not dispatched");
            } else {
                tracing::error!(%user_id, error = %e, "request failed");
            }
            failure_text(&e)
        }
    };
    deliver(&bot, chat_id, placeholder.as_ref(), &reply).await;

    drop(image);
    Ok(())
}
