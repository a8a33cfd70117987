//! OpenAI-compatible backend (chat completions).
//!
//! Works against any provider exposing `POST {base_url}/chat/completions` with
//! bearer auth; the base URL and key come from the user's stored settings.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use ltb_core::{
    errors::Error,
    model::{ChatBackend, CompletionRequest, ImageSource},
    Result,
};

#[derive(Clone, Debug)]
pub struct OpenAiBackend {
    http: reqwest::Client,
    timeout: Duration,
}

impl OpenAiBackend {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("http client build failed: {e}")))?;
        Ok(Self { http, timeout })
    }

    async fn send(&self, req: &CompletionRequest, body: Value) -> Result<String> {
        if req.api_key.trim().is_empty() {
            return Err(Error::Config(
                "API key is not configured (use /set_api_key)".to_string(),
            ));
        }

        let url = completions_url(&req.base_url);
        tracing::debug!(%url, model = %req.model, "posting chat completion");

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&req.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Backend(format!("request timed out after {:?}", self.timeout))
                } else {
                    Error::Backend(format!("request error: {e}"))
                }
            })?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| Error::Backend(format!("failed to read response body: {e}")))?;

        if !status.is_success() {
            return Err(Error::Backend(format!(
                "chat completion failed: {status} {}",
                text.chars().take(200).collect::<String>()
            )));
        }

        extract_reply(&text)
    }
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    async fn complete_text(&self, req: &CompletionRequest) -> Result<String> {
        self.send(req, text_request_body(req)).await
    }

    async fn complete_multimodal(
        &self,
        req: &CompletionRequest,
        image: Option<&ImageSource>,
    ) -> Result<String> {
        self.send(req, multimodal_request_body(req, image)).await
    }
}

pub fn completions_url(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim().trim_end_matches('/'))
}

pub fn text_request_body(req: &CompletionRequest) -> Value {
    json!({
        "model": req.model,
        "messages": [
            { "role": "system", "content": req.system_prompt },
            { "role": "user", "content": req.user_text },
        ],
    })
}

pub fn multimodal_request_body(req: &CompletionRequest, image: Option<&ImageSource>) -> Value {
    let mut content = vec![json!({ "type": "text", "text": req.user_text })];
    if let Some(img) = image {
        content.push(json!({
            "type": "image_url",
            "image_url": { "url": img.to_url() },
        }));
    }

    json!({
        "model": req.model,
        "messages": [
            { "role": "system", "content": req.system_prompt },
            { "role": "user", "content": content },
        ],
    })
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// First choice's message content, verbatim.
pub fn extract_reply(body: &str) -> Result<String> {
    let parsed: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|e| Error::Backend(format!("invalid completion response: {e}")))?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| Error::Backend("completion response has no message content".to_string()))
}
