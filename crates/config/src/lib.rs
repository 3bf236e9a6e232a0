//! Configuration loading, validation, and management for Talewright.
//!
//! Loads configuration from `~/.talewright/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.talewright/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default text-generation provider for pipeline stages
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per generation
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Pipeline defaults
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Token streaming wrapper
    #[serde(default)]
    pub streaming: StreamingConfig,

    /// Unified inference client
    #[serde(default)]
    pub inference: InferenceConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    512
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("providers", &self.providers)
            .field("pipeline", &self.pipeline)
            .field("streaming", &self.streaming)
            .field("inference", &self.inference)
            .field("logging", &self.logging)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

impl std::fmt::Debug for StreamingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &redact(&self.api_key))
            .field("timeout_secs", &self.timeout_secs)
            .field("queue_capacity", &self.queue_capacity)
            .field("unbounded_queue", &self.unbounded_queue)
            .finish()
    }
}

impl std::fmt::Debug for InferenceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceConfig")
            .field("huggingface_url", &self.huggingface_url)
            .field("huggingface_metadata_url", &self.huggingface_metadata_url)
            .field("openai_url", &self.openai_url)
            .field("ollama_url", &self.ollama_url)
            .field("hf_token", &redact(&self.hf_token))
            .field("max_attempts", &self.max_attempts)
            .field("retry_fallback_ms", &self.retry_fallback_ms)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Stage specs run by `talewright run` when none are given,
    /// e.g. `"accumulate:max_chunks=3"`.
    #[serde(default = "default_stages")]
    pub stages: Vec<String>,

    /// Session id stamped on chunks when the caller gives none
    #[serde(default = "default_session_id")]
    pub default_session_id: String,
}

fn default_stages() -> Vec<String> {
    vec!["summarize".into()]
}
fn default_session_id() -> String {
    "default".into()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stages: default_stages(),
            default_session_id: default_session_id(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// NDJSON token endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// 0 disables the timeout
    #[serde(default = "default_stream_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Never block the producer on a slow consumer
    #[serde(default)]
    pub unbounded_queue: bool,
}

fn default_stream_timeout() -> u64 {
    30
}
fn default_queue_capacity() -> usize {
    256
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            timeout_secs: default_stream_timeout(),
            queue_capacity: default_queue_capacity(),
            unbounded_queue: false,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    #[serde(default = "default_hf_url")]
    pub huggingface_url: String,

    #[serde(default = "default_hf_metadata_url")]
    pub huggingface_metadata_url: String,

    #[serde(default = "default_openai_url")]
    pub openai_url: String,

    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hf_token: Option<String>,

    /// Total attempts on a 503, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay when the provider gives no hint
    #[serde(default = "default_retry_fallback_ms")]
    pub retry_fallback_ms: u64,
}

fn default_hf_url() -> String {
    "https://api-inference.huggingface.co/models".into()
}
fn default_hf_metadata_url() -> String {
    "https://huggingface.co/api".into()
}
fn default_openai_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_ollama_url() -> String {
    "http://localhost:11434".into()
}
fn default_max_attempts() -> u32 {
    3
}
fn default_retry_fallback_ms() -> u64 {
    2000
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            huggingface_url: default_hf_url(),
            huggingface_metadata_url: default_hf_metadata_url(),
            openai_url: default_openai_url(),
            ollama_url: default_ollama_url(),
            hf_token: None,
            max_attempts: default_max_attempts(),
            retry_fallback_ms: default_retry_fallback_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "pretty".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.talewright/config.toml).
    ///
    /// Also checks environment variables:
    /// - `TALEWRIGHT_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `HF_TOKEN`, then `HUGGINGFACE_API_TOKEN`
    /// - `TALEWRIGHT_PROVIDER`, `TALEWRIGHT_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("TALEWRIGHT_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if config.inference.hf_token.is_none() {
            config.inference.hf_token = std::env::var("HF_TOKEN")
                .ok()
                .or_else(|| std::env::var("HUGGINGFACE_API_TOKEN").ok());
        }

        if let Ok(provider) = std::env::var("TALEWRIGHT_PROVIDER") {
            config.default_provider = provider;
        }

        if let Ok(model) = std::env::var("TALEWRIGHT_MODEL") {
            config.default_model = model;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".talewright")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.default_temperature) {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.inference.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "inference.max_attempts must be at least 1".into(),
            ));
        }

        if !self.streaming.unbounded_queue && self.streaming.queue_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "streaming.queue_capacity must be > 0 for a bounded queue".into(),
            ));
        }

        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(ConfigError::ValidationError(format!(
                "logging.format must be \"pretty\" or \"json\", got \"{}\"",
                self.logging.format
            )));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `config init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            providers: HashMap::new(),
            pipeline: PipelineConfig::default(),
            streaming: StreamingConfig::default(),
            inference: InferenceConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
