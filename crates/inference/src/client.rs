//! Capability-gated inference across Hugging Face, OpenAI and Ollama.
//!
//! Every `generate_*` call first resolves the model's [`ModelCapabilities`]
//! and refuses unsupported modalities before any generation request is sent.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Value, json};
use talewright_config::AppConfig;
use talewright_core::{
    CancellationToken, HttpRequest, HttpResponse, HttpTransport, InferenceError, TransportError,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::capabilities::{CapabilityCache, ModelCapabilities};
use crate::parse;
use crate::retry::{RetryDelay, RetryPolicy, SERVICE_UNAVAILABLE, TokioDelay};
use crate::settings::{self, Params};
use crate::types::{
    AudioRequest, AudioResponse, ImageRequest, ImageResponse, InferenceProvider, InferenceSettings,
    MediaResponse, Modality, MusicRequest, TextRequest, TextResponse, VideoRequest,
};

const DEFAULT_VOICE: &str = "alloy";

/// Endpoints and credentials for [`UnifiedInferenceClient`].
#[derive(Clone)]
pub struct ClientOptions {
    pub huggingface_url: String,
    pub huggingface_metadata_url: String,
    pub openai_url: String,
    pub ollama_url: String,
    pub hf_token: Option<String>,
    pub openai_api_key: Option<String>,
    pub retry: RetryPolicy,
}

impl ClientOptions {
    /// The OpenAI key comes from `[providers.openai]`, then the top-level key.
    pub fn from_config(config: &AppConfig) -> Self {
        let inference = &config.inference;
        let openai_api_key = config
            .providers
            .get("openai")
            .and_then(|p| p.api_key.clone())
            .or_else(|| config.api_key.clone());
        let hf_token = inference.hf_token.clone().or_else(|| {
            config
                .providers
                .get("huggingface")
                .and_then(|p| p.api_key.clone())
        });

        Self {
            huggingface_url: trim_base(&inference.huggingface_url),
            huggingface_metadata_url: trim_base(&inference.huggingface_metadata_url),
            openai_url: trim_base(&inference.openai_url),
            ollama_url: trim_base(&inference.ollama_url),
            hf_token,
            openai_api_key,
            retry: RetryPolicy::from_config(inference),
        }
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl std::fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "***");
        f.debug_struct("ClientOptions")
            .field("huggingface_url", &self.huggingface_url)
            .field("huggingface_metadata_url", &self.huggingface_metadata_url)
            .field("openai_url", &self.openai_url)
            .field("ollama_url", &self.ollama_url)
            .field("hf_token", &redact(&self.hf_token))
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("retry", &self.retry)
            .finish()
    }
}

fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

pub struct UnifiedInferenceClient {
    transport: Arc<dyn HttpTransport>,
    options: ClientOptions,
    delay: Arc<dyn RetryDelay>,
    cache: CapabilityCache,
}

impl UnifiedInferenceClient {
    pub fn new(transport: Arc<dyn HttpTransport>, options: ClientOptions) -> Self {
        Self {
            transport,
            options,
            delay: Arc::new(TokioDelay),
            cache: CapabilityCache::new(),
        }
    }

    pub fn with_retry_delay(mut self, delay: Arc<dyn RetryDelay>) -> Self {
        self.delay = delay;
        self
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    // --- Capabilities ---

    pub async fn capabilities(
        &self,
        provider: InferenceProvider,
        model_id: &str,
        cancel: &CancellationToken,
    ) -> Result<ModelCapabilities, InferenceError> {
        let model_id = require_model(model_id)?;
        match provider {
            InferenceProvider::OpenAi => Ok(ModelCapabilities::openai(model_id)),
            InferenceProvider::Ollama => Ok(ModelCapabilities::ollama()),
            InferenceProvider::HuggingFace => {
                self.cache
                    .get_or_fetch(CapabilityCache::key(provider, model_id), || {
                        self.fetch_hub_capabilities(model_id, cancel)
                    })
                    .await
            }
        }
    }

    async fn fetch_hub_capabilities(
        &self,
        model_id: &str,
        cancel: &CancellationToken,
    ) -> Result<ModelCapabilities, InferenceError> {
        let url = format!("{}/models/{}", self.options.huggingface_metadata_url, model_id);
        debug!(model = model_id, url = %url, "Fetching model capabilities");

        let request = HttpRequest::get(url).bearer(self.options.hf_token.as_deref());
        let response = self
            .transport
            .send(request, cancel)
            .await
            .map_err(inference_error_from_transport)?;

        if !response.is_success() {
            warn!(
                model = model_id,
                status = response.status,
                "Model metadata unavailable; treating capabilities as unknown"
            );
            return Ok(ModelCapabilities::unknown());
        }

        match serde_json::from_slice::<Value>(&response.body) {
            Ok(document) => Ok(ModelCapabilities::from_hub_metadata(&document)),
            Err(e) => {
                warn!(model = model_id, error = %e, "Model metadata was not JSON");
                Ok(ModelCapabilities::unknown())
            }
        }
    }

    async fn gate(
        &self,
        provider: InferenceProvider,
        model_id: &str,
        modality: Modality,
        cancel: &CancellationToken,
    ) -> Result<ModelCapabilities, InferenceError> {
        let capabilities = self.capabilities(provider, model_id, cancel).await?;
        if let Err(e) = capabilities.ensure(modality, model_id.trim()) {
            warn!(provider = %provider, model = model_id, modality = %modality, error = %e, "Modality refused");
            return Err(e);
        }
        Ok(capabilities)
    }

    // --- Text ---

    pub async fn generate_text(
        &self,
        request: &TextRequest,
        cancel: &CancellationToken,
    ) -> Result<TextResponse, InferenceError> {
        let caps = self
            .gate(request.provider, &request.model_id, Modality::Text, cancel)
            .await?;
        let model = request.model_id.trim();
        let settings = &request.settings;

        match request.provider {
            InferenceProvider::HuggingFace => {
                let body = json!({
                    "inputs": request.prompt,
                    "parameters": settings::hf_text_parameters(settings, &caps),
                    "options": settings::hf_options(settings),
                });
                let response = self.send_checked(request.provider, self.hf_json(model, &body, settings), cancel).await?;
                Ok(parse::hf_text(&response))
            }
            InferenceProvider::OpenAi => {
                let mut body = settings::openai_parameters(settings, &caps);
                body.insert("model".into(), json!(model));
                body.insert(
                    "messages".into(),
                    json!([{ "role": "user", "content": request.prompt }]),
                );
                let http = self.openai_json("/chat/completions", &Value::Object(body), settings);
                let response = self.send_checked(request.provider, http, cancel).await?;
                Ok(parse::openai_text(&response))
            }
            InferenceProvider::Ollama => {
                let body = json!({
                    "model": model,
                    "prompt": request.prompt,
                    "stream": false,
                    "options": settings::ollama_options(settings, &caps),
                });
                let url = format!("{}/api/generate", self.options.ollama_url);
                let http = with_header_overrides(HttpRequest::post_json(url, &body), settings);
                let response = self.send_checked(request.provider, http, cancel).await?;
                Ok(parse::ollama_text(&response))
            }
        }
    }

    // --- Image ---

    pub async fn generate_image(
        &self,
        request: &ImageRequest,
        cancel: &CancellationToken,
    ) -> Result<ImageResponse, InferenceError> {
        let caps = self
            .gate(request.provider, &request.model_id, Modality::Image, cancel)
            .await?;
        let model = request.model_id.trim();
        let settings = &request.settings;

        let http = match request.provider {
            InferenceProvider::HuggingFace => {
                let body = json!({
                    "inputs": request.prompt,
                    "parameters": settings::hf_image_parameters(settings, request.size.as_deref(), &caps),
                    "options": settings::hf_options(settings),
                });
                self.hf_json(model, &body, settings)
            }
            InferenceProvider::OpenAi => {
                let mut body = Params::new();
                body.insert("model".into(), json!(model));
                body.insert("prompt".into(), json!(request.prompt));
                if let Some(size) = &request.size {
                    body.insert("size".into(), json!(size));
                }
                settings::merge_overrides(&mut body, &settings.overrides);
                self.openai_json("/images/generations", &Value::Object(body), settings)
            }
            InferenceProvider::Ollama => {
                return Err(no_endpoint(request.provider, Modality::Image, model));
            }
        };

        let response = self.send_checked(request.provider, http, cancel).await?;
        Ok(parse::image(&response))
    }

    // --- Audio ---

    pub async fn generate_audio_tts(
        &self,
        request: &AudioRequest,
        cancel: &CancellationToken,
    ) -> Result<AudioResponse, InferenceError> {
        let text = request
            .text
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| InferenceError::InvalidRequest("text is required for speech".into()))?;
        self.gate(request.provider, &request.model_id, Modality::AudioTts, cancel)
            .await?;
        let model = request.model_id.trim();
        let settings = &request.settings;

        let http = match request.provider {
            InferenceProvider::HuggingFace => {
                let body = json!({
                    "inputs": text,
                    "parameters": settings::hf_media_parameters(settings),
                    "options": settings::hf_options(settings),
                });
                self.hf_json(model, &body, settings)
            }
            InferenceProvider::OpenAi => {
                let mut body = Params::new();
                body.insert("model".into(), json!(model));
                body.insert("input".into(), json!(text));
                body.insert(
                    "voice".into(),
                    json!(request.voice.as_deref().unwrap_or(DEFAULT_VOICE)),
                );
                settings::merge_overrides(&mut body, &settings.overrides);
                self.openai_json("/audio/speech", &Value::Object(body), settings)
            }
            InferenceProvider::Ollama => {
                return Err(no_endpoint(request.provider, Modality::AudioTts, model));
            }
        };

        let response = self.send_checked(request.provider, http, cancel).await?;
        Ok(parse::speech(&response))
    }

    pub async fn generate_audio_stt(
        &self,
        request: &AudioRequest,
        cancel: &CancellationToken,
    ) -> Result<AudioResponse, InferenceError> {
        let audio = request
            .audio
            .as_deref()
            .filter(|a| !a.is_empty())
            .ok_or_else(|| InferenceError::InvalidRequest("audio is required for transcription".into()))?;
        self.gate(request.provider, &request.model_id, Modality::AudioStt, cancel)
            .await?;
        let model = request.model_id.trim();
        let settings = &request.settings;

        let http = match request.provider {
            InferenceProvider::HuggingFace => {
                // Raw bodies cannot carry an options block; the API reads headers instead.
                let options = settings::hf_options(settings);
                let mut http = HttpRequest::post(self.hf_url(model), audio.to_vec())
                    .header("Content-Type", "application/octet-stream")
                    .bearer(self.hf_token(settings));
                if options.get(settings::WAIT_FOR_MODEL) == Some(&Value::Bool(true)) {
                    http = http.header("X-Wait-For-Model", "true");
                }
                if options.get(settings::USE_CACHE) == Some(&Value::Bool(false)) {
                    http = http.header("X-Use-Cache", "false");
                }
                with_header_overrides(http, settings)
            }
            InferenceProvider::OpenAi => {
                let boundary = format!("talewright-{}", Uuid::new_v4().simple());
                let mut fields = vec![("model", model)];
                if let Some(language) = request.language.as_deref() {
                    fields.push(("language", language));
                }
                let body = multipart_body(&boundary, &fields, "audio.wav", audio);
                let url = format!("{}/audio/transcriptions", self.options.openai_url);
                let http = HttpRequest::post(url, body)
                    .header(
                        "Content-Type",
                        format!("multipart/form-data; boundary={boundary}"),
                    )
                    .bearer(self.options.openai_api_key.as_deref());
                with_header_overrides(http, settings)
            }
            InferenceProvider::Ollama => {
                return Err(no_endpoint(request.provider, Modality::AudioStt, model));
            }
        };

        let response = self.send_checked(request.provider, http, cancel).await?;
        Ok(parse::transcript(&response))
    }

    // --- Video & music ---

    pub async fn generate_video(
        &self,
        request: &VideoRequest,
        cancel: &CancellationToken,
    ) -> Result<MediaResponse, InferenceError> {
        self.gate(request.provider, &request.model_id, Modality::Video, cancel)
            .await?;
        let mut parameters = Params::new();
        if let Some(duration) = request.duration {
            parameters.insert("duration_seconds".into(), json!(duration.as_secs_f64()));
        }
        self.hf_media(
            request.provider,
            &request.model_id,
            Modality::Video,
            &request.prompt,
            parameters,
            &request.settings,
            cancel,
        )
        .await
    }

    pub async fn generate_music(
        &self,
        request: &MusicRequest,
        cancel: &CancellationToken,
    ) -> Result<MediaResponse, InferenceError> {
        self.gate(request.provider, &request.model_id, Modality::Music, cancel)
            .await?;
        self.hf_media(
            request.provider,
            &request.model_id,
            Modality::Music,
            &request.prompt,
            Params::new(),
            &request.settings,
            cancel,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn hf_media(
        &self,
        provider: InferenceProvider,
        model_id: &str,
        modality: Modality,
        prompt: &str,
        mut parameters: Params,
        settings: &InferenceSettings,
        cancel: &CancellationToken,
    ) -> Result<MediaResponse, InferenceError> {
        let model = model_id.trim();
        if provider != InferenceProvider::HuggingFace {
            return Err(no_endpoint(provider, modality, model));
        }
        settings::merge_overrides(&mut parameters, &settings.overrides);
        let body = json!({
            "inputs": prompt,
            "parameters": parameters,
            "options": settings::hf_options(settings),
        });
        let response = self
            .send_checked(provider, self.hf_json(model, &body, settings), cancel)
            .await?;
        Ok(parse::media(&response))
    }

    // --- Request plumbing ---

    fn hf_url(&self, model: &str) -> String {
        format!("{}/{}", self.options.huggingface_url, model)
    }

    fn hf_token<'a>(&'a self, settings: &'a InferenceSettings) -> Option<&'a str> {
        settings::token_override(settings).or(self.options.hf_token.as_deref())
    }

    fn hf_json(&self, model: &str, body: &Value, settings: &InferenceSettings) -> HttpRequest {
        let http = HttpRequest::post_json(self.hf_url(model), body).bearer(self.hf_token(settings));
        with_header_overrides(http, settings)
    }

    fn openai_json(&self, path: &str, body: &Value, settings: &InferenceSettings) -> HttpRequest {
        let url = format!("{}{}", self.options.openai_url, path);
        let http = HttpRequest::post_json(url, body).bearer(self.options.openai_api_key.as_deref());
        with_header_overrides(http, settings)
    }

    /// Send with 503 retry, then fail on any non-success status.
    async fn send_checked(
        &self,
        provider: InferenceProvider,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, InferenceError> {
        let response = self.send_with_retry(provider, request, cancel).await?;
        parse::ensure_success(provider.as_str(), &response)?;
        Ok(response)
    }

    async fn send_with_retry(
        &self,
        provider: InferenceProvider,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, InferenceError> {
        let policy = self.options.retry;
        let mut attempt = 1;
        loop {
            if cancel.is_cancelled() {
                return Err(InferenceError::Canceled);
            }
            debug!(provider = %provider, url = %request.url, attempt, "Sending inference request");
            let response = self
                .transport
                .send(request.clone(), cancel)
                .await
                .map_err(inference_error_from_transport)?;

            if response.status != SERVICE_UNAVAILABLE || attempt >= policy.max_attempts {
                return Ok(response);
            }

            let delay = policy.delay_for(&response, Utc::now());
            info!(
                provider = %provider,
                attempt,
                max_attempts = policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Model unavailable, retrying"
            );
            self.delay.wait(delay, cancel).await?;
            attempt += 1;
        }
    }
}

fn require_model(model_id: &str) -> Result<&str, InferenceError> {
    let model_id = model_id.trim();
    if model_id.is_empty() {
        return Err(InferenceError::InvalidRequest("model id is required".into()));
    }
    Ok(model_id)
}

fn no_endpoint(provider: InferenceProvider, modality: Modality, model_id: &str) -> InferenceError {
    InferenceError::UnsupportedModality {
        modality: modality.as_str().into(),
        model_id: model_id.into(),
        reason: format!("{provider} has no {modality} endpoint"),
    }
}

fn with_header_overrides(mut request: HttpRequest, settings: &InferenceSettings) -> HttpRequest {
    for (name, value) in settings::header_overrides(settings) {
        request = request.header(name, value);
    }
    request
}

pub(crate) fn inference_error_from_transport(error: TransportError) -> InferenceError {
    match error {
        TransportError::Canceled => InferenceError::Canceled,
        other => InferenceError::Transport(other),
    }
}

fn multipart_body(boundary: &str, fields: &[(&str, &str)], file_name: &str, file: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(file.len() + 512);
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(file);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use talewright_core::HttpMethod;

    use super::*;
    use crate::test_support::{RecordingDelay, RoutedTransport};

    const HF_META: &str = "https://huggingface.co/api/models/";
    const HF_INFER: &str = "https://api-inference.huggingface.co/models/";

    fn client(transport: Arc<RoutedTransport>, delay: Arc<RecordingDelay>) -> UnifiedInferenceClient {
        let options = ClientOptions {
            hf_token: Some("hf_default".into()),
            openai_api_key: Some("sk-test".into()),
            ..ClientOptions::default()
        };
        UnifiedInferenceClient::new(transport, options).with_retry_delay(delay)
    }

    fn hub(tag: &str) -> HttpResponse {
        HttpResponse::new(200, format!(r#"{{"pipeline_tag":"{tag}","gated":false}}"#))
    }

    fn body_json(request: &HttpRequest) -> Value {
        serde_json::from_slice(&request.body).unwrap()
    }

    #[tokio::test]
    async fn retries_twice_on_503_then_succeeds() {
        let transport = Arc::new(
            RoutedTransport::new()
                .route(HF_META, hub("text-generation"))
                .route(HF_INFER, HttpResponse::new(503, "loading").with_header("Retry-After", "4"))
                .route(HF_INFER, HttpResponse::new(503, r#"{"error":"loading","estimated_time":1.5}"#))
                .route(HF_INFER, HttpResponse::new(200, r#"[{"generated_text":"The door creaks."}]"#)),
        );
        let delay = Arc::new(RecordingDelay::default());

        let response = client(transport.clone(), delay.clone())
            .generate_text(
                &TextRequest::new(InferenceProvider::HuggingFace, "gpt2", "Open the door"),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(response.text, "The door creaks.");
        assert_eq!(transport.calls_to(HF_INFER), 3);
        assert_eq!(delay.delays(), vec![Duration::from_secs(4), Duration::from_millis(1500)]);
    }

    #[tokio::test]
    async fn last_503_fails_with_payload() {
        let transport = Arc::new(
            RoutedTransport::new()
                .route(HF_META, hub("text-generation"))
                .route(HF_INFER, HttpResponse::new(503, "still loading")),
        );
        let delay = Arc::new(RecordingDelay::default());

        let err = client(transport.clone(), delay.clone())
            .generate_text(
                &TextRequest::new(InferenceProvider::HuggingFace, "gpt2", "p"),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        match err {
            InferenceError::HttpFailure { status, payload, .. } => {
                assert_eq!(status, 503);
                assert_eq!(payload, "still loading");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(transport.calls_to(HF_INFER), 3);
        assert_eq!(delay.delays(), vec![Duration::from_secs(2); 2]);
    }

    #[tokio::test]
    async fn other_failures_are_not_retried() {
        let transport = Arc::new(
            RoutedTransport::new()
                .route(HF_META, hub("text-generation"))
                .route(HF_INFER, HttpResponse::new(400, r#"{"error":"bad input"}"#)),
        );
        let err = client(transport.clone(), Arc::new(RecordingDelay::default()))
            .generate_text(
                &TextRequest::new(InferenceProvider::HuggingFace, "gpt2", "p"),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains(r#"{"error":"bad input"}"#));
        assert_eq!(transport.calls_to(HF_INFER), 1);
    }

    #[tokio::test]
    async fn image_against_text_model_never_generates() {
        let transport = Arc::new(RoutedTransport::new().route(HF_META, hub("text-generation")));
        let err = client(transport.clone(), Arc::new(RecordingDelay::default()))
            .generate_image(
                &ImageRequest::new(InferenceProvider::HuggingFace, "gpt2", "a castle"),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        match err {
            InferenceError::UnsupportedModality { modality, model_id, reason } => {
                assert_eq!(modality, "image");
                assert_eq!(model_id, "gpt2");
                assert_eq!(reason, "text-generation");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(transport.calls_to(HF_INFER), 0);
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn gated_model_reason() {
        let transport = Arc::new(RoutedTransport::new().route(
            HF_META,
            HttpResponse::new(200, r#"{"pipeline_tag":"text-to-image","gated":"auto"}"#),
        ));
        let err = client(transport, Arc::new(RecordingDelay::default()))
            .generate_text(
                &TextRequest::new(InferenceProvider::HuggingFace, "org/sdxl", "p"),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("model is gated"));
    }

    #[tokio::test]
    async fn capabilities_are_cached_case_insensitively() {
        let transport = Arc::new(
            RoutedTransport::new()
                .route(HF_META, hub("text-generation"))
                .route(HF_INFER, HttpResponse::new(200, r#"{"generated_text":"x"}"#)),
        );
        let client = client(transport.clone(), Arc::new(RecordingDelay::default()));
        let cancel = CancellationToken::new();

        client
            .capabilities(InferenceProvider::HuggingFace, "Org/Model", &cancel)
            .await
            .unwrap();
        client
            .generate_text(&TextRequest::new(InferenceProvider::HuggingFace, "org/model", "p"), &cancel)
            .await
            .unwrap();
        assert_eq!(transport.calls_to(HF_META), 1);
    }

    #[tokio::test]
    async fn unreadable_metadata_caches_unknown() {
        let transport = Arc::new(RoutedTransport::new().route(HF_META, HttpResponse::new(404, "missing")));
        let client = client(transport.clone(), Arc::new(RecordingDelay::default()));
        let cancel = CancellationToken::new();

        let caps = client
            .capabilities(InferenceProvider::HuggingFace, "ghost", &cancel)
            .await
            .unwrap();
        assert_eq!(caps, ModelCapabilities::unknown());
        let err = client
            .generate_text(&TextRequest::new(InferenceProvider::HuggingFace, "ghost", "p"), &cancel)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unknown pipeline"));
        assert_eq!(transport.calls_to(HF_META), 1);
    }

    #[tokio::test]
    async fn blank_model_is_invalid_and_sends_nothing() {
        let transport = Arc::new(RoutedTransport::new());
        let err = client(transport.clone(), Arc::new(RecordingDelay::default()))
            .generate_text(
                &TextRequest::new(InferenceProvider::OpenAi, "  ", "p"),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::InvalidRequest(_)));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn hf_text_payload_and_overrides() {
        let transport = Arc::new(
            RoutedTransport::new()
                .route(HF_META, hub("text-generation"))
                .route(HF_INFER, HttpResponse::new(200, r#"[{"generated_text":"ok"}]"#)),
        );
        let settings = InferenceSettings {
            temperature: Some(0.5),
            max_tokens: Some(20),
            ..Default::default()
        }
        .with_override("hf_token", json!("hf_override"))
        .with_override("header:X-Trace", json!("t-1"))
        .with_override("use_cache", json!(false));

        client(transport.clone(), Arc::new(RecordingDelay::default()))
            .generate_text(
                &TextRequest::new(InferenceProvider::HuggingFace, "gpt2", "Hello").with_settings(settings),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let sent = transport.last_to(HF_INFER).unwrap();
        assert_eq!(sent.url, format!("{HF_INFER}gpt2"));
        assert_eq!(sent.header_value("Authorization"), Some("Bearer hf_override"));
        assert_eq!(sent.header_value("X-Trace"), Some("t-1"));
        let body = body_json(&sent);
        assert_eq!(body["inputs"], "Hello");
        assert_eq!(body["parameters"], json!({ "temperature": 0.5, "max_new_tokens": 20 }));
        assert_eq!(body["options"], json!({ "use_cache": false, "wait_for_model": true }));

        let meta = transport.last_to(HF_META).unwrap();
        assert_eq!(meta.header_value("Authorization"), Some("Bearer hf_default"));
    }

    #[tokio::test]
    async fn openai_text_maps_settings() {
        let transport = Arc::new(RoutedTransport::new().route(
            "/chat/completions",
            HttpResponse::new(
                200,
                r#"{"choices":[{"message":{"content":"Hi"}}],"usage":{"total_tokens":9}}"#,
            ),
        ));
        let settings = InferenceSettings {
            temperature: Some(0.25),
            top_k: Some(5),
            seed: Some(1),
            stop_sequences: vec!["END".into()],
            ..Default::default()
        };

        let response = client(transport.clone(), Arc::new(RecordingDelay::default()))
            .generate_text(
                &TextRequest::new(InferenceProvider::OpenAi, "gpt-4o-mini", "Say hi").with_settings(settings),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(response.text, "Hi");
        assert_eq!(response.tokens_used, Some(9));

        let sent = &transport.requests()[0];
        assert_eq!(sent.url, "https://api.openai.com/v1/chat/completions");
        assert_eq!(sent.header_value("Authorization"), Some("Bearer sk-test"));
        let body = body_json(sent);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["content"], "Say hi");
        assert_eq!(body["temperature"], 0.25);
        assert_eq!(body["stop"], json!(["END"]));
        assert!(body.get("top_k").is_none());
        assert!(body.get("seed").is_none());
    }

    #[tokio::test]
    async fn ollama_generate_is_not_streamed() {
        let transport = Arc::new(RoutedTransport::new().route(
            "/api/generate",
            HttpResponse::new(200, r#"{"response":"Aye.","done":true}"#),
        ));
        let settings = InferenceSettings {
            max_tokens: Some(64),
            ..Default::default()
        };
        let response = client(transport.clone(), Arc::new(RecordingDelay::default()))
            .generate_text(
                &TextRequest::new(InferenceProvider::Ollama, "llama3", "p").with_settings(settings),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(response.text, "Aye.");

        let sent = &transport.requests()[0];
        assert_eq!(sent.url, "http://localhost:11434/api/generate");
        let body = body_json(sent);
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["num_predict"], 64);
    }

    #[tokio::test]
    async fn unsupported_provider_modalities_send_nothing() {
        let transport = Arc::new(RoutedTransport::new());
        let client = client(transport.clone(), Arc::new(RecordingDelay::default()));
        let cancel = CancellationToken::new();

        let err = client
            .generate_video(
                &VideoRequest {
                    provider: InferenceProvider::OpenAi,
                    model_id: "gpt-4o".into(),
                    prompt: "p".into(),
                    duration: None,
                    settings: InferenceSettings::default(),
                },
                &cancel,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::UnsupportedModality { .. }));

        let err = client
            .generate_image(&ImageRequest::new(InferenceProvider::Ollama, "llava", "p"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::UnsupportedModality { .. }));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn hf_image_returns_raw_bytes() {
        let transport = Arc::new(
            RoutedTransport::new()
                .route(HF_META, hub("text-to-image"))
                .route(
                    HF_INFER,
                    HttpResponse::new(200, vec![1u8, 2, 3]).with_header("Content-Type", "image/png"),
                ),
        );
        let mut request = ImageRequest::new(InferenceProvider::HuggingFace, "sdxl", "castle");
        request.size = Some("512x256".into());

        let response = client(transport.clone(), Arc::new(RecordingDelay::default()))
            .generate_image(&request, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.bytes, Some(vec![1, 2, 3]));

        let body = body_json(&transport.last_to(HF_INFER).unwrap());
        assert_eq!(body["parameters"]["width"], 512);
        assert_eq!(body["parameters"]["height"], 256);
    }

    #[tokio::test]
    async fn hf_transcription_posts_raw_audio() {
        let transport = Arc::new(
            RoutedTransport::new()
                .route(HF_META, hub("automatic-speech-recognition"))
                .route(HF_INFER, HttpResponse::new(200, r#"{"text":"hello"}"#)),
        );
        let response = client(transport.clone(), Arc::new(RecordingDelay::default()))
            .generate_audio_stt(
                &AudioRequest::transcription(InferenceProvider::HuggingFace, "whisper", vec![7, 7, 7]),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(response.transcript.as_deref(), Some("hello"));

        let sent = transport.last_to(HF_INFER).unwrap();
        assert_eq!(sent.method, HttpMethod::Post);
        assert_eq!(sent.body, vec![7, 7, 7]);
        assert_eq!(sent.header_value("X-Wait-For-Model"), Some("true"));
    }

    #[tokio::test]
    async fn openai_transcription_is_multipart() {
        let transport = Arc::new(
            RoutedTransport::new().route("/audio/transcriptions", HttpResponse::new(200, r#"{"text":"hi"}"#)),
        );
        let mut request = AudioRequest::transcription(InferenceProvider::OpenAi, "whisper-1", b"RIFF".to_vec());
        request.language = Some("en".into());

        let response = client(transport.clone(), Arc::new(RecordingDelay::default()))
            .generate_audio_stt(&request, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.transcript.as_deref(), Some("hi"));

        let sent = &transport.requests()[0];
        let content_type = sent.header_value("Content-Type").unwrap();
        assert!(content_type.starts_with("multipart/form-data; boundary="));
        let body = String::from_utf8_lossy(&sent.body);
        assert!(body.contains("name=\"model\"\r\n\r\nwhisper-1"));
        assert!(body.contains("name=\"language\"\r\n\r\nen"));
        assert!(body.contains("filename=\"audio.wav\""));
        assert!(body.contains("RIFF"));
    }

    #[tokio::test]
    async fn openai_speech_defaults_voice() {
        let transport = Arc::new(RoutedTransport::new().route(
            "/audio/speech",
            HttpResponse::new(200, vec![4u8, 5]).with_header("Content-Type", "audio/mpeg"),
        ));
        let response = client(transport.clone(), Arc::new(RecordingDelay::default()))
            .generate_audio_tts(
                &AudioRequest::speech(InferenceProvider::OpenAi, "tts-1", "Welcome, traveller."),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(response.audio_bytes, Some(vec![4, 5]));
        let body = body_json(&transport.requests()[0]);
        assert_eq!(body["voice"], "alloy");
        assert_eq!(body["input"], "Welcome, traveller.");
    }

    #[tokio::test]
    async fn hf_music_merges_overrides() {
        let transport = Arc::new(
            RoutedTransport::new()
                .route(HF_META, hub("text-to-music"))
                .route(
                    HF_INFER,
                    HttpResponse::new(200, r#"{"uri":"https://cdn/track.wav"}"#),
                ),
        );
        let request = MusicRequest {
            provider: InferenceProvider::HuggingFace,
            model_id: "musicgen".into(),
            prompt: "sea shanty".into(),
            settings: InferenceSettings::default().with_override("duration", json!(8)),
        };
        let response = client(transport.clone(), Arc::new(RecordingDelay::default()))
            .generate_music(&request, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.uri.as_deref(), Some("https://cdn/track.wav"));
        let body = body_json(&transport.last_to(HF_INFER).unwrap());
        assert_eq!(body["parameters"]["duration"], 8);
    }

    #[tokio::test]
    async fn transport_cancel_maps_to_canceled() {
        let transport = Arc::new(RoutedTransport::new().fail("/chat/completions", TransportError::Canceled));
        let err = client(transport, Arc::new(RecordingDelay::default()))
            .generate_text(
                &TextRequest::new(InferenceProvider::OpenAi, "gpt-4o", "p"),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::Canceled));
    }
}
