//! Requests, responses and provider-neutral settings.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InferenceProvider {
    HuggingFace,
    OpenAi,
    Ollama,
}

impl InferenceProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HuggingFace => "huggingface",
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
        }
    }
}

impl fmt::Display for InferenceProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InferenceProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "huggingface" | "hf" => Ok(Self::HuggingFace),
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(format!("unknown inference provider '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modality {
    Text,
    Image,
    AudioTts,
    AudioStt,
    Video,
    Music,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::AudioTts => "audio-tts",
            Self::AudioStt => "audio-stt",
            Self::Video => "video",
            Self::Music => "music",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider-neutral generation knobs. Unset fields are never sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceSettings {
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub top_k: Option<u32>,
    pub max_tokens: Option<u32>,
    pub do_sample: Option<bool>,
    pub repetition_penalty: Option<f64>,
    pub presence_penalty: Option<f64>,
    pub frequency_penalty: Option<f64>,
    pub return_full_text: Option<bool>,
    pub stop_sequences: Vec<String>,
    pub seed: Option<i64>,

    // Diffusion
    pub guidance_scale: Option<f64>,
    pub num_inference_steps: Option<u32>,
    pub height: Option<u32>,
    pub width: Option<u32>,
    pub scheduler: Option<String>,
    pub negative_prompt: Option<String>,

    // Hugging Face execution options
    pub use_cache: Option<bool>,
    pub wait_for_model: Option<bool>,

    /// Free-form provider parameters. A few keys are reserved:
    /// `use_cache`, `wait_for_model`, `hf_token` and `header:<Name>`.
    pub overrides: BTreeMap<String, serde_json::Value>,
}

impl InferenceSettings {
    pub fn with_override(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.overrides.insert(key.into(), value);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextRequest {
    pub provider: InferenceProvider,
    pub model_id: String,
    pub prompt: String,
    pub settings: InferenceSettings,
}

impl TextRequest {
    pub fn new(
        provider: InferenceProvider,
        model_id: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            model_id: model_id.into(),
            prompt: prompt.into(),
            settings: InferenceSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: InferenceSettings) -> Self {
        self.settings = settings;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub provider: InferenceProvider,
    pub model_id: String,
    pub prompt: String,
    /// `WxH`, e.g. `1024x768`.
    pub size: Option<String>,
    pub settings: InferenceSettings,
}

impl ImageRequest {
    pub fn new(
        provider: InferenceProvider,
        model_id: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            model_id: model_id.into(),
            prompt: prompt.into(),
            size: None,
            settings: InferenceSettings::default(),
        }
    }
}

/// Text-to-speech uses `text`; speech-to-text uses `audio`.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioRequest {
    pub provider: InferenceProvider,
    pub model_id: String,
    pub text: Option<String>,
    pub audio: Option<Vec<u8>>,
    pub voice: Option<String>,
    pub language: Option<String>,
    pub settings: InferenceSettings,
}

impl AudioRequest {
    pub fn speech(
        provider: InferenceProvider,
        model_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            model_id: model_id.into(),
            text: Some(text.into()),
            audio: None,
            voice: None,
            language: None,
            settings: InferenceSettings::default(),
        }
    }

    pub fn transcription(
        provider: InferenceProvider,
        model_id: impl Into<String>,
        audio: Vec<u8>,
    ) -> Self {
        Self {
            provider,
            model_id: model_id.into(),
            text: None,
            audio: Some(audio),
            voice: None,
            language: None,
            settings: InferenceSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoRequest {
    pub provider: InferenceProvider,
    pub model_id: String,
    pub prompt: String,
    pub duration: Option<Duration>,
    pub settings: InferenceSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MusicRequest {
    pub provider: InferenceProvider,
    pub model_id: String,
    pub prompt: String,
    pub settings: InferenceSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextResponse {
    pub text: String,
    pub tokens_used: Option<u32>,
    pub provider_metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageResponse {
    #[serde(skip)]
    pub bytes: Option<Vec<u8>>,
    pub uri: Option<String>,
    pub provider_metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioResponse {
    #[serde(skip)]
    pub audio_bytes: Option<Vec<u8>>,
    pub transcript: Option<String>,
    pub provider_metadata: serde_json::Value,
}

/// Video and music results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaResponse {
    #[serde(skip)]
    pub bytes: Option<Vec<u8>>,
    pub uri: Option<String>,
    pub provider_metadata: serde_json::Value,
}
