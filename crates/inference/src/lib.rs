//! # Talewright Inference
//!
//! One client for text, image, speech, transcription, video and music
//! across Hugging Face, OpenAI and Ollama.
//!
//! - Capability descriptors are fetched once per model and gate every call.
//! - Provider-neutral [`InferenceSettings`] map to native parameter names.
//! - "Model loading" responses (503) are retried with the provider's hint.
//! - Responses are decoded tolerantly; odd shapes end up in `provider_metadata`.
//!
//! [`UnifiedTextService`] exposes the text path as a
//! [`talewright_core::TextGenerationService`] for pipeline stages.

pub mod capabilities;
pub mod client;
pub mod parse;
pub mod retry;
pub mod service;
pub mod settings;
pub mod types;

pub use capabilities::{CapabilityCache, ModelCapabilities};
pub use client::{ClientOptions, UnifiedInferenceClient};
pub use retry::{RetryDelay, RetryPolicy, TokioDelay};
pub use service::UnifiedTextService;
pub use types::{
    AudioRequest, AudioResponse, ImageRequest, ImageResponse, InferenceProvider,
    InferenceSettings, MediaResponse, Modality, MusicRequest, TextRequest, TextResponse,
    VideoRequest,
};
