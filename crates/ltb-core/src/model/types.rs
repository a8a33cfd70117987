use std::{borrow::Cow, fmt};

/// Image reference embedded in a multimodal request.
#[derive(Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Remote image fetched by the provider.
    Url(String),
    /// Local file inlined as base64.
    DataUri { mime: String, base64: String },
}

impl ImageSource {
    /// The value for an `image_url.url` field.
    pub fn to_url(&self) -> Cow<'_, str> {
        match self {
            ImageSource::Url(u) => Cow::Borrowed(u),
            ImageSource::DataUri { mime, base64 } => {
                Cow::Owned(format!("data:{mime};base64,{base64}"))
            }
        }
    }
}

impl fmt::Debug for ImageSource {
    // Payloads can be megabytes; keep logs readable.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSource::Url(u) => f.debug_tuple("Url").field(u).finish(),
            ImageSource::DataUri { mime, base64 } => f
                .debug_struct("DataUri")
                .field("mime", mime)
                .field("base64_len", &base64.len())
                .finish(),
        }
    }
}

/// One fully-resolved completion call.
#[derive(Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub system_prompt: String,
    pub user_text: String,
}

impl fmt::Debug for CompletionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionRequest")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("system_prompt", &self.system_prompt)
            .field("user_text", &self.user_text)
            .finish()
    }
}
