//! [`TextGenerationService`] backed by the unified client.

use std::sync::Arc;

use async_trait::async_trait;
use talewright_core::{
    CancellationToken, GenerationMetadata, GenerationRequest, GenerationResponse, InferenceError,
    ProviderError, TextGenerationService, TransportError,
};

use crate::client::UnifiedInferenceClient;
use crate::types::{InferenceProvider, InferenceSettings, TextRequest};

/// Pins one provider and model so pipeline stages can use the unified client.
pub struct UnifiedTextService {
    client: Arc<UnifiedInferenceClient>,
    provider: InferenceProvider,
    model_id: String,
    name: String,
}

impl UnifiedTextService {
    pub fn new(
        client: Arc<UnifiedInferenceClient>,
        provider: InferenceProvider,
        model_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            provider,
            model_id: model_id.into(),
            name: format!("unified:{}", provider.as_str()),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[async_trait]
impl TextGenerationService for UnifiedTextService {
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

        let settings = InferenceSettings {
            temperature: request.settings.temperature.map(f64::from),
            max_tokens: request.settings.max_output_tokens,
            ..Default::default()
        };
        let text_request = TextRequest::new(self.provider, &self.model_id, &request.prompt)
            .with_settings(settings);

        let response = self
            .client
            .generate_text(&text_request, cancel)
            .await
            .map_err(provider_error_from_inference)?;

        Ok(GenerationResponse {
            text: response.text,
            metadata: GenerationMetadata {
                provider: Some(self.provider.as_str().into()),
                model: Some(self.model_id.clone()),
                input_tokens: None,
                output_tokens: response.tokens_used,
            },
        })
    }
}

fn provider_error_from_inference(error: InferenceError) -> ProviderError {
    match error {
        InferenceError::UnsupportedModality { .. } => ProviderError::Unsupported(error.to_string()),
        InferenceError::HttpFailure { status: 429, .. } => {
            ProviderError::RateLimited { retry_after_secs: 5 }
        }
        InferenceError::HttpFailure {
            status: 401 | 403,
            payload,
            ..
        } => ProviderError::AuthenticationFailed(payload),
        InferenceError::HttpFailure { status, payload, .. } => ProviderError::ApiError {
            status_code: status,
            message: payload,
        },
        InferenceError::InvalidRequest(message) => ProviderError::NotConfigured(message),
        InferenceError::Transport(TransportError::Timeout(message)) => ProviderError::Timeout(message),
        InferenceError::Transport(TransportError::Network(message)) => ProviderError::Network(message),
        InferenceError::Transport(TransportError::Canceled) | InferenceError::Canceled => {
            ProviderError::Canceled
        }
    }
}

#[cfg(test)]
mod tests {
    use talewright_core::{GenerationSettings, HttpResponse};

    use super::*;
    use crate::client::ClientOptions;
    use crate::test_support::{RecordingDelay, RoutedTransport};

    fn service(transport: Arc<RoutedTransport>, provider: InferenceProvider, model: &str) -> UnifiedTextService {
        let client = UnifiedInferenceClient::new(transport, ClientOptions::default())
            .with_retry_delay(Arc::new(RecordingDelay::default()));
        UnifiedTextService::new(Arc::new(client), provider, model)
    }

    #[tokio::test]
    async fn generates_through_the_client() {
        let transport = Arc::new(RoutedTransport::new().route(
            "/api/generate",
            HttpResponse::new(200, r#"{"response":"The tavern is quiet.","eval_count":6}"#),
        ));
        let svc = service(transport.clone(), InferenceProvider::Ollama, "llama3");
        let request = GenerationRequest::new("Describe the tavern").with_settings(GenerationSettings {
            temperature: None,
            max_output_tokens: Some(40),
        });

        let response = svc.generate(&request, &CancellationToken::new()).await.unwrap();
        assert_eq!(svc.name(), "unified:ollama");
        assert_eq!(response.text, "The tavern is quiet.");
        assert_eq!(response.metadata.model.as_deref(), Some("llama3"));
        assert_eq!(response.metadata.output_tokens, Some(6));

        let body: serde_json::Value = serde_json::from_slice(&transport.requests()[0].body).unwrap();
        assert_eq!(body["options"]["num_predict"], 40);
    }

    #[tokio::test]
    async fn errors_map_to_provider_errors() {
        let transport = Arc::new(
            RoutedTransport::new().route("/chat/completions", HttpResponse::new(401, "bad key")),
        );
        let err = service(transport, InferenceProvider::OpenAi, "gpt-4o")
            .generate(&GenerationRequest::new("p"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::AuthenticationFailed(ref m) if m == "bad key"));

        let transport = Arc::new(RoutedTransport::new().route(
            "https://huggingface.co/api/models/",
            HttpResponse::new(200, r#"{"pipeline_tag":"text-to-image"}"#),
        ));
        let err = service(transport, InferenceProvider::HuggingFace, "sdxl")
            .generate(&GenerationRequest::new("p"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Unsupported(_)));
    }

    #[test]
    fn transport_failures_keep_their_kind() {
        assert!(matches!(
            provider_error_from_inference(InferenceError::Transport(TransportError::Timeout("slow".into()))),
            ProviderError::Timeout(_)
        ));
        assert!(matches!(
            provider_error_from_inference(InferenceError::Canceled),
            ProviderError::Canceled
        ));
        assert!(matches!(
            provider_error_from_inference(InferenceError::HttpFailure {
                provider: "openai".into(),
                status: 500,
                payload: "boom".into()
            }),
            ProviderError::ApiError { status_code: 500, .. }
        ));
    }
}
