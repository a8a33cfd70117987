use async_trait::async_trait;

use crate::Result;

use super::types::{CompletionRequest, ImageSource};

/// A chat-completion provider.
///
/// Implementations own transport concerns (HTTP, auth headers, timeouts) and
/// return the first choice's message content verbatim.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// System message plus a plain-string user message.
    async fn complete_text(&self, req: &CompletionRequest) -> Result<String>;

    /// System message plus a content-array user message: the text part, then the
    /// image part when one is given.
    async fn complete_multimodal(
        &self,
        req: &CompletionRequest,
        image: Option<&ImageSource>,
    ) -> Result<String>;
}
