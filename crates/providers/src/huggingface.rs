//! Hugging Face hosted text generation.
//!
//! POSTs `{"inputs": prompt, "parameters": {...}}` to `{base}/{model}` and
//! reads the first `generated_text` of the returned array.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use talewright_core::{
    CancellationToken, GenerationMetadata, GenerationRequest, GenerationResponse,
    GenerationSettings, HttpRequest, HttpTransport, ProviderError, TextGenerationService,
};
use tracing::{debug, warn};

use crate::{check_status, provider_error_from_transport};

pub const DEFAULT_BASE_URL: &str = "https://api-inference.huggingface.co/models";

pub struct HuggingFaceTextService {
    endpoint: String,
    api_token: Option<String>,
    model: String,
    transport: Arc<dyn HttpTransport>,
}

impl HuggingFaceTextService {
    pub fn new(
        base_url: impl Into<String>,
        api_token: Option<String>,
        model: impl Into<String>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        let model = model.into();
        let base_url = base_url.into();
        Self {
            endpoint: format!("{}/{}", base_url.trim_end_matches('/'), model),
            api_token,
            model,
            transport,
        }
    }

    /// Post to `endpoint` exactly, ignoring the model path convention.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn parameters(settings: &GenerationSettings) -> Option<serde_json::Value> {
        let mut parameters = serde_json::Map::new();
        if let Some(max_tokens) = settings.max_output_tokens {
            parameters.insert("max_new_tokens".into(), serde_json::json!(max_tokens));
        }
        if let Some(temperature) = settings.temperature {
            parameters.insert("temperature".into(), serde_json::json!(temperature));
        }
        (!parameters.is_empty()).then_some(serde_json::Value::Object(parameters))
    }
}

#[derive(Debug, Deserialize)]
struct GeneratedText {
    generated_text: String,
}

#[async_trait]
impl TextGenerationService for HuggingFaceTextService {
    fn name(&self) -> &str {
        "huggingface"
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationResponse, ProviderError> {
        if cancel.is_cancelled() {
            return Err(ProviderError::Canceled);
        }

        let mut body = serde_json::json!({ "inputs": request.prompt });
        if let Some(parameters) = Self::parameters(&request.settings) {
            body["parameters"] = parameters;
        }
        debug!(model = %self.model, endpoint = %self.endpoint, "Sending text generation request");

        let http_request =
            HttpRequest::post_json(&self.endpoint, &body).bearer(self.api_token.as_deref());
        let response = self
            .transport
            .send(http_request, cancel)
            .await
            .map_err(provider_error_from_transport)?;

        check_status("huggingface", &response)?;

        let parsed: Vec<GeneratedText> = serde_json::from_slice(&response.body)
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        let metadata = GenerationMetadata {
            provider: Some("huggingface".into()),
            model: Some(self.model.clone()),
            ..Default::default()
        };

        let text = match parsed.into_iter().next() {
            Some(first) => first.generated_text,
            None => {
                warn!("HuggingFace response was empty.");
                String::new()
            }
        };

        Ok(GenerationResponse { text, metadata })
    }
}
