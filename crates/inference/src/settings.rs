//! Map [`InferenceSettings`] onto each provider's parameter names.
//!
//! Keys the model's capabilities mark unsupported are dropped. Overrides
//! only fill keys the typed settings left unset, and reserved override keys
//! never reach a provider payload.

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};

use crate::capabilities::ModelCapabilities;
use crate::types::InferenceSettings;

pub type Params = Map<String, Value>;

pub const USE_CACHE: &str = "use_cache";
pub const WAIT_FOR_MODEL: &str = "wait_for_model";
pub const HF_TOKEN: &str = "hf_token";
pub const HEADER_PREFIX: &str = "header:";

pub fn is_reserved(key: &str) -> bool {
    key == USE_CACHE
        || key == WAIT_FOR_MODEL
        || key == HF_TOKEN
        || key.to_ascii_lowercase().starts_with(HEADER_PREFIX)
}

struct Builder<'a> {
    params: Params,
    capabilities: &'a ModelCapabilities,
}

impl<'a> Builder<'a> {
    fn new(capabilities: &'a ModelCapabilities) -> Self {
        Self {
            params: Params::new(),
            capabilities,
        }
    }

    fn set<T: Into<Value>>(&mut self, key: &str, value: Option<T>) -> &mut Self {
        if let Some(value) = value
            && self.capabilities.allows_setting(key)
        {
            self.params.insert(key.to_string(), value.into());
        }
        self
    }

    fn stop(&mut self, key: &str, stop: &[String]) -> &mut Self {
        let stop = (!stop.is_empty()).then(|| json!(stop));
        self.set(key, stop)
    }

    fn finish(&mut self, overrides: &BTreeMap<String, Value>) -> Params {
        let mut params = std::mem::take(&mut self.params);
        merge_overrides(&mut params, overrides);
        params
    }
}

pub fn hf_text_parameters(settings: &InferenceSettings, capabilities: &ModelCapabilities) -> Params {
    Builder::new(capabilities)
        .set("temperature", settings.temperature)
        .set("top_p", settings.top_p)
        .set("top_k", settings.top_k)
        .set("max_new_tokens", settings.max_tokens)
        .set("do_sample", settings.do_sample)
        .set("repetition_penalty", settings.repetition_penalty)
        .set("return_full_text", settings.return_full_text)
        .stop("stop", &settings.stop_sequences)
        .set("seed", settings.seed)
        .finish(&settings.overrides)
}

/// A `WxH` size, when given and well formed, wins over `width`/`height`.
pub fn hf_image_parameters(
    settings: &InferenceSettings,
    size: Option<&str>,
    capabilities: &ModelCapabilities,
) -> Params {
    let (width, height) = match size.and_then(parse_size) {
        Some((w, h)) => (Some(w), Some(h)),
        None => (settings.width, settings.height),
    };
    Builder::new(capabilities)
        .set("guidance_scale", settings.guidance_scale)
        .set("num_inference_steps", settings.num_inference_steps)
        .set("height", height)
        .set("width", width)
        .set("scheduler", settings.scheduler.clone())
        .set("negative_prompt", settings.negative_prompt.clone())
        .set("seed", settings.seed)
        .finish(&settings.overrides)
}

/// Parameters for media pipelines (speech, video, music): overrides only.
pub fn hf_media_parameters(settings: &InferenceSettings) -> Params {
    let mut params = Params::new();
    merge_overrides(&mut params, &settings.overrides);
    params
}

/// `options` block; `wait_for_model` defaults to true.
pub fn hf_options(settings: &InferenceSettings) -> Params {
    let mut options = Params::new();
    if let Some(use_cache) = settings.use_cache {
        options.insert(USE_CACHE.into(), json!(use_cache));
    }
    options.insert(WAIT_FOR_MODEL.into(), json!(settings.wait_for_model.unwrap_or(true)));

    for key in [USE_CACHE, WAIT_FOR_MODEL] {
        if let Some(Value::Bool(flag)) = settings.overrides.get(key) {
            options.insert(key.into(), json!(flag));
        }
    }
    options
}

pub fn openai_parameters(settings: &InferenceSettings, capabilities: &ModelCapabilities) -> Params {
    Builder::new(capabilities)
        .set("temperature", settings.temperature)
        .set("top_p", settings.top_p)
        .set("max_tokens", settings.max_tokens)
        .set("presence_penalty", settings.presence_penalty)
        .set("frequency_penalty", settings.frequency_penalty)
        .stop("stop", &settings.stop_sequences)
        .set("seed", settings.seed)
        .finish(&settings.overrides)
}

pub fn ollama_options(settings: &InferenceSettings, capabilities: &ModelCapabilities) -> Params {
    Builder::new(capabilities)
        .set("temperature", settings.temperature)
        .set("top_p", settings.top_p)
        .set("top_k", settings.top_k)
        .set("num_predict", settings.max_tokens)
        .set("repeat_penalty", settings.repetition_penalty)
        .stop("stop", &settings.stop_sequences)
        .set("seed", settings.seed)
        .finish(&settings.overrides)
}

/// Copy overrides into `params` where the key is still free.
pub fn merge_overrides(params: &mut Params, overrides: &BTreeMap<String, Value>) {
    for (key, value) in overrides {
        if is_reserved(key) || params.contains_key(key) {
            continue;
        }
        params.insert(key.clone(), value.clone());
    }
}

/// Bearer token override for Hugging Face calls.
pub fn token_override(settings: &InferenceSettings) -> Option<&str> {
    settings
        .overrides
        .get(HF_TOKEN)
        .and_then(Value::as_str)
        .filter(|t| !t.trim().is_empty())
}

/// Extra request headers from `header:<Name>` overrides.
pub fn header_overrides(settings: &InferenceSettings) -> Vec<(String, String)> {
    settings
        .overrides
        .iter()
        .filter_map(|(key, value)| {
            let prefix = key.get(..HEADER_PREFIX.len())?;
            if !prefix.eq_ignore_ascii_case(HEADER_PREFIX) {
                return None;
            }
            let name = key[HEADER_PREFIX.len()..].trim();
            if name.is_empty() {
                return None;
            }
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Some((name.to_string(), value))
        })
        .collect()
}

fn parse_size(size: &str) -> Option<(u32, u32)> {
    let (w, h) = size.trim().split_once(['x', 'X'])?;
    Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
}
