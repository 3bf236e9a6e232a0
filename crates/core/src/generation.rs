//! Text generation: the abstraction over LLM backends used by pipeline stages.
//!
//! Implementations: OpenAI-compatible chat, Hugging Face text generation,
//! and the unified inference client adapter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;

/// Provider-neutral knobs for a single generation call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

/// A prompt plus settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,

    #[serde(default)]
    pub settings: GenerationSettings,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            settings: GenerationSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }
}

/// What the provider reported about a call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub text: String,

    #[serde(default)]
    pub metadata: GenerationMetadata,
}

/// The core text-generation trait.
///
/// Implementations must check `cancel` before doing any work and return
/// [`ProviderError::Canceled`] when it fires mid-call.
#[async_trait]
pub trait TextGenerationService: Send + Sync {
    /// A human-readable name for this service (e.g., "openai", "huggingface").
    fn name(&self) -> &str;

    async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationResponse, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_omit_unset_fields() {
        let json = serde_json::to_string(&GenerationSettings::default()).unwrap();
        assert_eq!(json, "{}");
    }

    #[test]
    fn request_builder() {
        let req = GenerationRequest::new("hello").with_settings(GenerationSettings {
            temperature: Some(0.2),
            max_output_tokens: Some(64),
        });
        assert_eq!(req.prompt, "hello");
        assert_eq!(req.settings.max_output_tokens, Some(64));
    }
}
