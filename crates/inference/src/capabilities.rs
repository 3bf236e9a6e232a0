//! Model capability descriptors and their per-model cache.
//!
//! Hugging Face capabilities come from the hub metadata endpoint; OpenAI and
//! Ollama are derived from the model name alone.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use talewright_core::InferenceError;
use tokio::sync::OnceCell;

use crate::types::{InferenceProvider, Modality};

const HF_TEXT_SETTINGS: &[&str] = &[
    "temperature",
    "top_p",
    "top_k",
    "max_new_tokens",
    "do_sample",
    "repetition_penalty",
    "return_full_text",
    "stop",
    "seed",
];

const HF_IMAGE_SETTINGS: &[&str] = &[
    "guidance_scale",
    "num_inference_steps",
    "height",
    "width",
    "scheduler",
    "negative_prompt",
    "seed",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelCapabilities {
    pub supports_text: bool,
    pub supports_image: bool,
    pub supports_audio_tts: bool,
    pub supports_audio_stt: bool,
    pub supports_video: bool,
    pub supports_music: bool,
    /// Provider parameter name → accepted. Absent keys are accepted.
    pub settings_support: BTreeMap<String, bool>,
    pub pipeline_tag: Option<String>,
    pub gated: bool,
    pub inference_status: Option<String>,
}

impl ModelCapabilities {
    /// Nothing supported; used when metadata could not be read.
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Derive Hugging Face modalities from the hub pipeline tag.
    pub fn from_pipeline_tag(
        pipeline_tag: Option<&str>,
        gated: bool,
        inference_status: Option<String>,
    ) -> Self {
        let tag = pipeline_tag.map(str::to_ascii_lowercase).unwrap_or_default();
        let supports_text = matches!(
            tag.as_str(),
            "text-generation" | "text2text-generation" | "conversational"
        );
        let supports_image = tag.contains("image");

        let mut settings_support = BTreeMap::new();
        for key in HF_TEXT_SETTINGS {
            settings_support.insert((*key).to_string(), supports_text);
        }
        for key in HF_IMAGE_SETTINGS {
            let entry = settings_support.entry((*key).to_string()).or_insert(false);
            *entry |= supports_image;
        }

        Self {
            supports_text,
            supports_image,
            supports_audio_tts: tag == "text-to-speech",
            supports_audio_stt: tag == "automatic-speech-recognition",
            supports_video: tag.contains("video"),
            supports_music: tag.contains("music"),
            settings_support,
            pipeline_tag: pipeline_tag.map(str::to_string),
            gated,
            inference_status,
        }
    }

    pub fn openai(model_id: &str) -> Self {
        let model = model_id.to_ascii_lowercase();
        let settings_support = [
            ("temperature", true),
            ("top_p", true),
            ("max_tokens", true),
            ("presence_penalty", true),
            ("frequency_penalty", true),
            ("stop", true),
            ("top_k", false),
            ("seed", false),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            supports_text: true,
            supports_image: model.contains("gpt-4o")
                || model.contains("gpt-4.1")
                || model.contains("dall-e"),
            supports_audio_tts: model.contains("tts") || model.contains("gpt-4o-audio"),
            supports_audio_stt: model.contains("whisper") || model.contains("gpt-4o-audio"),
            settings_support,
            ..Self::default()
        }
    }

    pub fn ollama() -> Self {
        let settings_support = [
            ("temperature", true),
            ("top_p", true),
            ("top_k", true),
            ("num_predict", true),
            ("repeat_penalty", true),
            ("stop", true),
            ("presence_penalty", false),
            ("frequency_penalty", false),
            ("seed", false),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            supports_text: true,
            settings_support,
            ..Self::default()
        }
    }

    pub fn supports(&self, modality: Modality) -> bool {
        match modality {
            Modality::Text => self.supports_text,
            Modality::Image => self.supports_image,
            Modality::AudioTts => self.supports_audio_tts,
            Modality::AudioStt => self.supports_audio_stt,
            Modality::Video => self.supports_video,
            Modality::Music => self.supports_music,
        }
    }

    pub fn allows_setting(&self, key: &str) -> bool {
        self.settings_support.get(key).copied().unwrap_or(true)
    }

    /// Why a modality is refused, most specific cause first.
    pub fn unsupported_reason(&self) -> String {
        if self.gated {
            return "model is gated".into();
        }
        if let Some(status) = self
            .inference_status
            .as_deref()
            .filter(|s| !s.eq_ignore_ascii_case("loaded"))
        {
            return format!("status={status}");
        }
        match &self.pipeline_tag {
            Some(tag) => tag.clone(),
            None => "unknown pipeline".into(),
        }
    }

    /// Fail with [`InferenceError::UnsupportedModality`] unless `modality` is available.
    pub fn ensure(&self, modality: Modality, model_id: &str) -> Result<(), InferenceError> {
        if self.supports(modality) {
            return Ok(());
        }
        Err(InferenceError::UnsupportedModality {
            modality: modality.as_str().into(),
            model_id: model_id.into(),
            reason: self.unsupported_reason(),
        })
    }

    /// Read `pipeline_tag`, `gated` and `inference` from a hub model document.
    pub fn from_hub_metadata(document: &serde_json::Value) -> Self {
        let pipeline_tag = document.get("pipeline_tag").and_then(|v| v.as_str());
        let gated = match document.get("gated") {
            Some(serde_json::Value::Bool(b)) => *b,
            // "auto" and "manual" both mean access must be requested
            Some(serde_json::Value::String(s)) => !s.is_empty() && !s.eq_ignore_ascii_case("false"),
            _ => false,
        };
        let inference_status = match document.get("inference") {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Object(o)) => {
                o.get("status").and_then(|v| v.as_str()).map(str::to_string)
            }
            _ => None,
        };
        Self::from_pipeline_tag(pipeline_tag, gated, inference_status)
    }
}

/// One entry per `(provider, lowercased model id)`.
///
/// Concurrent lookups of the same key share a single fetch. Failed fetches
/// are not cached, so the next caller tries again.
#[derive(Default)]
pub struct CapabilityCache {
    entries: Mutex<HashMap<String, Arc<OnceCell<ModelCapabilities>>>>,
}

impl CapabilityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(provider: InferenceProvider, model_id: &str) -> String {
        format!("{}:{}", provider.as_str(), model_id.trim().to_ascii_lowercase())
    }

    pub async fn get_or_fetch<F, Fut>(
        &self,
        key: String,
        fetch: F,
    ) -> Result<ModelCapabilities, InferenceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ModelCapabilities, InferenceError>>,
    {
        let cell = {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            entries.entry(key).or_default().clone()
        };
        cell.get_or_try_init(fetch).await.cloned()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
