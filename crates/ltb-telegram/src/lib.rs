//! Telegram transport (teloxide).
//!
//! Turns updates into guarded pipeline runs and settings writes; everything
//! provider-specific lives behind `ltb-core`'s ports.

use teloxide::RequestError;
use tokio::time::sleep;

pub mod handlers;
pub mod router;

/// Telegram rejects message texts longer than this many characters.
pub const MAX_MESSAGE_LEN: usize = 4096;

/// Runs a Bot API call, retrying once when Telegram answers with `RetryAfter`.
pub(crate) async fn with_retry<T, Fut>(mut op: impl FnMut() -> Fut) -> Result<T, RequestError>
where
    Fut: std::future::IntoFuture<Output = Result<T, RequestError>>,
{
    const MAX_RETRIES: usize = 1;
    let mut attempts = 0usize;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(RequestError::RetryAfter(d)) if attempts < MAX_RETRIES => {
                attempts += 1;
                tracing::warn!(wait = ?d, "telegram flood control, retrying");
                sleep(d).await;
            }
            Err(e) => return Err(e),
        }
    }
}
