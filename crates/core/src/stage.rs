//! Stage contracts: Source, Transform, and Sink.
//!
//! Each stage declares the chunk type it produces or accepts so a pipeline
//! can be checked before anything runs. Streams are lazy: nothing is
//! produced until the sink starts pulling.

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::chunk::{Chunk, ChunkType};
use crate::error::StageError;

/// A lazily-produced sequence of chunks.
pub type ChunkStream = BoxStream<'static, Result<Chunk, StageError>>;

/// Produces the initial chunk stream of a run.
pub trait Source: Send + Sync {
    fn output_type(&self) -> ChunkType;

    fn stream(&self, cancel: CancellationToken) -> ChunkStream;
}

/// Maps one chunk stream to another.
pub trait Transform: Send + Sync {
    fn input_type(&self) -> ChunkType;

    fn output_type(&self) -> ChunkType;

    fn transform(&self, input: ChunkStream, cancel: CancellationToken) -> ChunkStream;
}

/// Consumes the final stream and produces the run's result.
#[async_trait]
pub trait Sink: Send + Sync {
    type Output: Send;

    fn input_type(&self) -> ChunkType;

    async fn consume(
        &self,
        input: ChunkStream,
        cancel: CancellationToken,
    ) -> Result<Self::Output, StageError>;
}
