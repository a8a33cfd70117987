//! Dispatch of a validated request to the right backend call shape.

mod image;
mod routing;

use std::{path::PathBuf, sync::Arc};

use crate::{
    errors::Error,
    model::{ChatBackend, CompletionRequest},
    settings::UserSettings,
    Result,
};

pub use image::prepare_image;
pub use routing::{model_looks_multimodal, route_for, Route, MULTIMODAL_MARKERS};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Input for one dispatch. At most one of `image_path` / `image_url` is expected;
/// if both are set the URL is used.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipelineRequest {
    pub user_input: String,
    pub image_path: Option<PathBuf>,
    pub image_url: Option<String>,
    /// Overrides the user's configured system prompt for this call only.
    pub system_prompt: Option<String>,
}

impl PipelineRequest {
    pub fn text(user_input: impl Into<String>) -> Self {
        Self {
            user_input: user_input.into(),
            ..Self::default()
        }
    }

    pub fn with_image_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.image_path = Some(path.into());
        self
    }

    pub fn with_image_url(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn has_image(&self) -> bool {
        self.image_path.is_some() || self.image_url.is_some()
    }
}

/// Routes requests to a [`ChatBackend`]. Built once at startup and shared.
#[derive(Clone)]
pub struct Pipeline {
    backend: Arc<dyn ChatBackend>,
    default_base_url: String,
}

impl Pipeline {
    pub fn new(backend: Arc<dyn ChatBackend>, default_base_url: impl Into<String>) -> Self {
        Self {
            backend,
            default_base_url: default_base_url.into(),
        }
    }

    /// Run one request against the user's provider.
    ///
    /// Errors:
    /// - `Error::Config` when no model name is configured (no network call is made);
    /// - `Error::InvalidPath` when the local image is missing or not an image;
    /// - `Error::Backend` for every other failure, carrying the detail for logs.
    pub async fn run(&self, settings: &UserSettings, req: PipelineRequest) -> Result<String> {
        let model = settings
            .model_name
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .ok_or_else(|| {
                Error::Config("model name is not configured (use /set_model)".to_string())
            })?;

        let route = route_for(model, req.has_image());
        tracing::info!(model, route = route.as_str(), "dispatching request");

        let completion = CompletionRequest {
            api_key: settings.api_key.clone().unwrap_or_default(),
            base_url: settings
                .base_url
                .clone()
                .unwrap_or_else(|| self.default_base_url.clone()),
            model: model.to_string(),
            system_prompt: resolve_system_prompt(
                req.system_prompt.as_deref(),
                settings.system_prompt.as_deref(),
            )
            .to_string(),
            user_text: req.user_input,
        };

        let result = match route {
            Route::Text => self.backend.complete_text(&completion).await,
            Route::Multimodal => {
                let image = prepare_image(req.image_path.as_deref(), req.image_url.as_deref())
                    .await
                    .inspect_err(|e| tracing::warn!(error = %e, "image preparation failed"))?;
                self.backend
                    .complete_multimodal(&completion, image.as_ref())
                    .await
            }
        };

        result.map_err(|e| {
            tracing::error!(model, route = route.as_str(), error = %e, "backend call failed");
            match e {
                e if e.is_user_actionable() => e,
                Error::Backend(msg) => Error::Backend(msg),
                other => Error::Backend(format!("pipeline execution failed: {other}")),
            }
        })
    }
}

/// Per-call override, then the user's stored prompt, then [`DEFAULT_SYSTEM_PROMPT`].
pub fn resolve_system_prompt<'a>(
    override_prompt: Option<&'a str>,
    configured: Option<&'a str>,
) -> &'a str {
    override_prompt
        .filter(|p| !p.trim().is_empty())
        .or(configured.filter(|p| !p.trim().is_empty()))
        .unwrap_or(DEFAULT_SYSTEM_PROMPT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ImageSource;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Clone, Debug, PartialEq, Eq)]
    enum Call {
        Text(CompletionRequest),
        Multimodal(CompletionRequest, Option<ImageSource>),
    }

    #[derive(Default)]
    struct RecordingBackend {
        calls: Mutex<Vec<Call>>,
        fail_with: Option<fn() -> Error>,
    }

    impl RecordingBackend {
        fn failing(f: fn() -> Error) -> Self {
            Self {
                fail_with: Some(f),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatBackend for RecordingBackend {
        async fn complete_text(&self, req: &CompletionRequest) -> Result<String> {
            self.calls.lock().unwrap().push(Call::Text(req.clone()));
            match self.fail_with {
                Some(f) => Err(f()),
                None => Ok(format!("TEXT:{}", req.user_text)),
            }
        }

        async fn complete_multimodal(
            &self,
            req: &CompletionRequest,
            image: Option<&ImageSource>,
        ) -> Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Multimodal(req.clone(), image.cloned()));
            match self.fail_with {
                Some(f) => Err(f()),
                None => Ok(format!("IMG:{}:{}", req.user_text, image.is_some())),
            }
        }
    }

    fn settings(model: &str) -> UserSettings {
        UserSettings {
            api_key: Some("sk-test".into()),
            model_name: Some(model.into()),
            ..UserSettings::default()
        }
    }

    fn pipeline(backend: Arc<RecordingBackend>) -> Pipeline {
        Pipeline::new(backend, "https://api.openai.com/v1")
    }

    fn tmp_image() -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let p = PathBuf::from(format!("/tmp/ltb-pipeline-{}-{ts}.jpg", std::process::id()));
        std::fs::write(&p, [0xFF, 0xD8, 0xFF]).unwrap();
        p
    }

    #[tokio::test]
    async fn text_model_without_image_goes_text() {
        let backend = Arc::new(RecordingBackend::default());
        let out = pipeline(backend.clone())
            .run(&settings("gpt-4-turbo"), PipelineRequest::text("hola"))
            .await
            .unwrap();
        assert_eq!(out, "TEXT:hola");

        let calls = backend.calls();
        assert_eq!(calls.len(), 1);
        let Call::Text(req) = &calls[0] else {
            panic!("expected text call: {calls:?}");
        };
        assert_eq!(req.model, "gpt-4-turbo");
        assert_eq!(req.base_url, "https://api.openai.com/v1");
        assert_eq!(req.system_prompt, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(req.api_key, "sk-test");
    }

    #[tokio::test]
    async fn image_path_forces_multimodal() {
        let backend = Arc::new(RecordingBackend::default());
        let img = tmp_image();
        let out = pipeline(backend.clone())
            .run(
                &settings("gpt-4-turbo"),
                PipelineRequest::text("describe").with_image_path(&img),
            )
            .await
            .unwrap();
        assert_eq!(out, "IMG:describe:true");

        match &backend.calls()[0] {
            Call::Multimodal(_, Some(ImageSource::DataUri { mime, base64 })) => {
                assert_eq!(mime, "image/jpeg");
                assert_eq!(base64, "/9j/");
            }
            other => panic!("unexpected call {other:?}"),
        }
        let _ = std::fs::remove_file(&img);
    }

    #[tokio::test]
    async fn image_url_is_forwarded_verbatim() {
        let backend = Arc::new(RecordingBackend::default());
        pipeline(backend.clone())
            .run(
                &settings("gpt-4-turbo"),
                PipelineRequest::text("what is this").with_image_url("https://x/cat.png"),
            )
            .await
            .unwrap();
        assert_eq!(
            backend.calls()[0],
            Call::Multimodal(
                CompletionRequest {
                    api_key: "sk-test".into(),
                    base_url: "https://api.openai.com/v1".into(),
                    model: "gpt-4-turbo".into(),
                    system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
                    user_text: "what is this".into(),
                },
                Some(ImageSource::Url("https://x/cat.png".into())),
            )
        );
    }

    #[tokio::test]
    async fn vision_model_name_goes_multimodal_without_image() {
        let backend = Arc::new(RecordingBackend::default());
        let out = pipeline(backend.clone())
            .run(&settings("gpt-4o"), PipelineRequest::text("hola"))
            .await
            .unwrap();
        assert_eq!(out, "IMG:hola:false");
        assert!(matches!(backend.calls()[0], Call::Multimodal(_, None)));
    }

    #[tokio::test]
    async fn missing_model_fails_before_any_call() {
        let backend = Arc::new(RecordingBackend::default());
        let mut s = settings("x");
        s.model_name = None;
        let err = pipeline(backend.clone())
            .run(&s, PipelineRequest::text("hola"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)), "{err}");
        assert!(backend.calls().is_empty());

        s.model_name = Some("   ".into());
        assert!(pipeline(backend.clone())
            .run(&s, PipelineRequest::text("hola"))
            .await
            .is_err());
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_image_file_is_actionable_and_skips_backend() {
        let backend = Arc::new(RecordingBackend::default());
        let err = pipeline(backend.clone())
            .run(
                &settings("gpt-4o"),
                PipelineRequest::text("x").with_image_path("/tmp/ltb-no-such-file.png"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPath { .. }), "{err}");
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn downstream_failures_become_backend_errors() {
        let backend = Arc::new(RecordingBackend::failing(|| {
            Error::External("connection reset".into())
        }));
        let err = pipeline(backend)
            .run(&settings("gpt-4-turbo"), PipelineRequest::text("x"))
            .await
            .unwrap_err();
        match err {
            Error::Backend(msg) => assert!(msg.contains("connection reset"), "{msg}"),
            other => panic!("unexpected {other:?}"),
        }

        let backend = Arc::new(RecordingBackend::failing(|| Error::Backend("429".into())));
        let err = pipeline(backend)
            .run(&settings("gpt-4o"), PipelineRequest::text("x"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "backend error: 429");
    }

    #[tokio::test]
    async fn system_prompt_precedence_and_base_url() {
        let backend = Arc::new(RecordingBackend::default());
        let mut s = settings("gpt-4-turbo");
        s.system_prompt = Some("stored".into());
        s.base_url = Some("http://localhost:11434/v1".into());
        let p = pipeline(backend.clone());

        p.run(&s, PipelineRequest::text("a")).await.unwrap();
        p.run(&s, PipelineRequest::text("b").with_system_prompt("override"))
            .await
            .unwrap();

        let calls = backend.calls();
        let prompts: Vec<_> = calls
            .iter()
            .map(|c| match c {
                Call::Text(r) => (r.system_prompt.clone(), r.base_url.clone()),
                Call::Multimodal(r, _) => (r.system_prompt.clone(), r.base_url.clone()),
            })
            .collect();
        assert_eq!(
            prompts,
            vec![
                ("stored".to_string(), "http://localhost:11434/v1".to_string()),
                ("override".to_string(), "http://localhost:11434/v1".to_string()),
            ]
        );
    }

    #[test]
    fn resolve_prompt_skips_blanks() {
        assert_eq!(resolve_system_prompt(Some(" "), Some("c")), "c");
        assert_eq!(resolve_system_prompt(None, Some("")), DEFAULT_SYSTEM_PROMPT);
        assert_eq!(resolve_system_prompt(Some("o"), Some("c")), "o");
    }
}
