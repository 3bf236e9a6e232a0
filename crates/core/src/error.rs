//! Error types for the Talewright domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`Error`] collects them.

use std::fmt;

use thiserror::Error;

/// The top-level error type for all Talewright operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Pipeline stage errors ---
    #[error("Stage error: {0}")]
    Stage(#[from] StageError),

    #[error("Stage construction failed: {0}")]
    StageBuild(#[from] StageBuildError),

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    // --- Network ---
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures raised by a text-generation provider.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not supported: {0}")]
    Unsupported(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Generation canceled")]
    Canceled,
}

/// Classification of a failed pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    None,
    Unknown,
    TypeMismatch,
    DecodeFailure,
    SourceFailed,
    TransformFailed,
    SinkFailed,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Unknown => "unknown",
            Self::TypeMismatch => "type_mismatch",
            Self::DecodeFailure => "decode_failure",
            Self::SourceFailed => "source_failed",
            Self::TransformFailed => "transform_failed",
            Self::SinkFailed => "sink_failed",
        };
        f.write_str(s)
    }
}

/// Errors raised from inside a pipeline stage.
///
/// Every variant except [`StageError::Unexpected`] carries a message that is
/// safe to surface to a user. The runner never exposes the wrapped source of
/// an unexpected error, only its short type name.
#[derive(Debug, Error)]
pub enum StageError {
    /// The stage refused to continue (policy, moderation, quota).
    #[error("blocked: {0}")]
    Blocked(String),

    /// Bytes could not be turned into text.
    #[error("decode failure: {0}")]
    Decode(String),

    /// A declared stage failure with its classification.
    #[error("{kind}: {message}")]
    Failed { kind: FailureKind, message: String },

    #[error("stage canceled")]
    Canceled,

    #[error("unexpected {type_name} error")]
    Unexpected {
        type_name: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl StageError {
    pub fn source_failed(message: impl Into<String>) -> Self {
        Self::Failed {
            kind: FailureKind::SourceFailed,
            message: message.into(),
        }
    }

    pub fn transform_failed(message: impl Into<String>) -> Self {
        Self::Failed {
            kind: FailureKind::TransformFailed,
            message: message.into(),
        }
    }

    pub fn sink_failed(message: impl Into<String>) -> Self {
        Self::Failed {
            kind: FailureKind::SinkFailed,
            message: message.into(),
        }
    }

    /// Wrap an arbitrary error, remembering only its short type name.
    pub fn unexpected<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let full = std::any::type_name::<E>();
        let type_name = full
            .split('<')
            .next()
            .and_then(|path| path.rsplit("::").next())
            .unwrap_or(full);
        Self::Unexpected {
            type_name,
            source: Box::new(error),
        }
    }
}

/// Invalid chunk metadata operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    #[error("annotation key cannot be empty")]
    EmptyKey,
}

/// Failures while constructing a stage from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageBuildError {
    #[error("unknown stage: {0}")]
    UnknownStage(String),

    #[error("invalid stage spec: {0}")]
    InvalidSpec(String),

    #[error("invalid argument for {stage}: {reason}")]
    InvalidArgument { stage: String, reason: String },
}

/// Failures from the outbound HTTP transport.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("request canceled")]
    Canceled,
}

/// Error classes reported by the streaming provider wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum StreamErrorClass {
    NetworkTimeout,
    HttpError,
    DecodeError,
}

impl StreamErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "NetworkTimeout",
            Self::HttpError => "HttpError",
            Self::DecodeError => "DecodeError",
        }
    }
}

impl fmt::Display for StreamErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal error of a token stream.
#[derive(Debug, Clone, Error)]
pub enum StreamError {
    #[error("{class}: {message}")]
    Provider {
        class: StreamErrorClass,
        message: String,
        status_code: Option<u16>,
        details: Option<String>,
    },

    /// The caller canceled; never produced by a timeout.
    #[error("stream canceled")]
    Canceled,
}

impl StreamError {
    pub fn provider(class: StreamErrorClass, message: impl Into<String>) -> Self {
        Self::Provider {
            class,
            message: message.into(),
            status_code: None,
            details: None,
        }
    }

    pub fn class(&self) -> Option<StreamErrorClass> {
        match self {
            Self::Provider { class, .. } => Some(*class),
            Self::Canceled => None,
        }
    }
}

/// Failures from the unified inference client.
#[derive(Debug, Clone, Error)]
pub enum InferenceError {
    #[error("{modality} not supported for model '{model_id}' ({reason})")]
    UnsupportedModality {
        modality: String,
        model_id: String,
        reason: String,
    },

    /// Non-success response; `payload` is the provider body verbatim.
    #[error("{provider} request failed with {status}: {payload}")]
    HttpFailure {
        provider: String,
        status: u16,
        payload: String,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("request canceled")]
    Canceled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("secret connection string leaked")]
    struct DatabaseMeltdown;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn unexpected_keeps_only_short_type_name() {
        let err = StageError::unexpected(DatabaseMeltdown);
        match &err {
            StageError::Unexpected { type_name, .. } => assert_eq!(*type_name, "DatabaseMeltdown"),
            other => panic!("unexpected variant: {other:?}"),
        }
        assert!(!err.to_string().contains("secret"));
    }

    #[test]
    fn http_failure_keeps_payload_verbatim() {
        let err = InferenceError::HttpFailure {
            provider: "huggingface".into(),
            status: 400,
            payload: r#"{"error":"bad input"}"#.into(),
        };
        assert!(err.to_string().contains(r#"{"error":"bad input"}"#));
    }

    #[test]
    fn stream_error_class_is_distinct_from_cancel() {
        let timeout = StreamError::provider(StreamErrorClass::NetworkTimeout, "Provider call timed out");
        assert_eq!(timeout.class(), Some(StreamErrorClass::NetworkTimeout));
        assert_eq!(StreamError::Canceled.class(), None);
    }
}
