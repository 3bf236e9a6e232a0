//! # Talewright Core
//!
//! Domain types, traits, and error definitions for the Talewright narration
//! pipeline. This crate has **no runtime or HTTP dependencies**: it defines
//! the chunk model and the seams every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every subsystem boundary is a trait here:
//! - [`Source`], [`Transform`], [`Sink`] for pipeline stages
//! - [`TextGenerationService`] for LLM backends
//! - [`HttpTransport`] for outbound network calls
//!
//! Implementations live in their respective crates, which keeps tests free
//! to substitute scripted fakes for anything that talks to the network.

pub mod chunk;
pub mod error;
pub mod generation;
pub mod stage;
pub mod transport;

// Re-export key types at crate root for ergonomics
pub use chunk::{BytesChunk, Chunk, ChunkMetadata, ChunkType, TextChunk};
pub use error::{
    Error, FailureKind, InferenceError, MetadataError, ProviderError, Result, StageBuildError,
    StageError, StreamError, StreamErrorClass, TransportError,
};
pub use generation::{
    GenerationMetadata, GenerationRequest, GenerationResponse, GenerationSettings,
    TextGenerationService,
};
pub use stage::{ChunkStream, Sink, Source, Transform};
pub use transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, StreamingResponse};

pub use tokio_util::sync::CancellationToken;
