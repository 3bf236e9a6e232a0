//! OpenAI-compatible text generation.
//!
//! Works with OpenAI, OpenRouter, Ollama, vLLM, Groq, Together AI and any
//! endpoint exposing `/chat/completions`. The prompt is sent as a single
//! user message and the first choice's content is returned.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use talewright_core::{
    CancellationToken, GenerationMetadata, GenerationRequest, GenerationResponse, HttpRequest,
    HttpTransport, ProviderError, TextGenerationService,
};
use tracing::debug;

use crate::{check_status, provider_error_from_transport};

/// An OpenAI-compatible chat completion service.
pub struct OpenAiCompatService {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    transport: Arc<dyn HttpTransport>,
}

impl OpenAiCompatService {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            transport,
        }
    }

    /// Create an OpenAI service (convenience constructor).
    pub fn openai(
        api_key: impl Into<String>,
        model: impl Into<String>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key, model, transport)
    }

    /// Create an Ollama service (convenience constructor).
    pub fn ollama(
        base_url: Option<&str>,
        model: impl Into<String>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "", // Ollama doesn't need a key
            model,
            transport,
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request_body(&self, request: &GenerationRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": request.prompt }],
            "stream": false,
        });
        if let Some(temperature) = request.settings.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }
        if let Some(max_tokens) = request.settings.max_output_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        body
    }
}

#[async_trait]
impl TextGenerationService for OpenAiCompatService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationResponse, ProviderError> {
        if cancel.is_cancelled() {
            return Err(ProviderError::Canceled);
        }

        let url = format!("{}/chat/completions", self.base_url);
        debug!(provider = %self.name, model = %self.model, "Sending completion request");

        let http_request =
            HttpRequest::post_json(url, &self.request_body(request)).bearer(Some(&self.api_key));
        let response = self
            .transport
            .send(http_request, cancel)
            .await
            .map_err(provider_error_from_transport)?;

        check_status(&self.name, &response)?;

        let api_response: ApiResponse = serde_json::from_slice(&response.body)
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".into()))?;

        Ok(GenerationResponse {
            text: choice.message.content.unwrap_or_default(),
            metadata: GenerationMetadata {
                provider: Some(self.name.clone()),
                model: Some(api_response.model.unwrap_or_else(|| self.model.clone())),
                input_tokens: api_response.usage.as_ref().map(|u| u.prompt_tokens),
                output_tokens: api_response.usage.as_ref().map(|u| u.completion_tokens),
            },
        })
    }
}

// --- OpenAI API wire types ---

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}
