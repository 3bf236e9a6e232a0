//! Text entry and exit points: [`TextSource`] and [`TextCollectingSink`].

use async_stream::try_stream;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use talewright_core::{
    CancellationToken, Chunk, ChunkMetadata, ChunkStream, ChunkType, Sink, Source, StageError,
};

/// What a [`TextSource`] emits.
#[derive(Debug, Clone)]
pub enum TextInput {
    /// One text chunk.
    Complete(String),
    /// One text chunk per piece, in order.
    Pieces(Vec<String>),
    /// Bytes chunks tagged with `encoding`, to be decoded downstream.
    Bytes {
        chunks: Vec<Vec<u8>>,
        encoding: Option<String>,
    },
}

/// Emits caller-supplied text or bytes.
#[derive(Debug, Clone)]
pub struct TextSource {
    input: TextInput,
}

impl TextSource {
    pub fn new(input: TextInput) -> Self {
        Self { input }
    }

    pub fn complete(text: impl Into<String>) -> Self {
        Self::new(TextInput::Complete(text.into()))
    }
}

impl Source for TextSource {
    fn output_type(&self) -> ChunkType {
        match self.input {
            TextInput::Bytes { .. } => ChunkType::BYTES,
            _ => ChunkType::TEXT,
        }
    }

    fn stream(&self, cancel: CancellationToken) -> ChunkStream {
        source_stream(self.input.clone(), cancel).boxed()
    }
}

fn source_stream(
    input: TextInput,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<Chunk, StageError>> + Send + 'static {
    try_stream! {
        match input {
            TextInput::Bytes { chunks, encoding } => {
                let encoding = match encoding {
                    Some(name) if !name.trim().is_empty() => name,
                    _ => Err(StageError::source_failed("Byte stream requires an explicit encoding name"))?,
                };
                let metadata = ChunkMetadata::empty().with_text_encoding(encoding);
                for bytes in chunks {
                    ensure_active(&cancel)?;
                    yield Chunk::bytes(bytes, metadata.clone());
                }
            }
            TextInput::Complete(text) => {
                ensure_active(&cancel)?;
                yield Chunk::text(text, ChunkMetadata::empty());
            }
            TextInput::Pieces(pieces) => {
                for piece in pieces {
                    ensure_active(&cancel)?;
                    yield Chunk::text(piece, ChunkMetadata::empty());
                }
            }
        }
    }
}

fn ensure_active(cancel: &CancellationToken) -> Result<(), StageError> {
    if cancel.is_cancelled() {
        return Err(StageError::Canceled);
    }
    Ok(())
}

/// Everything a [`TextCollectingSink`] saw.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectedText {
    pub text: String,
    pub chunk_count: usize,
    /// Metadata of the final chunk, where story state ends up.
    pub last_metadata: Option<ChunkMetadata>,
}

/// Concatenates every text chunk.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextCollectingSink;

impl TextCollectingSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Sink for TextCollectingSink {
    type Output = CollectedText;

    fn input_type(&self) -> ChunkType {
        ChunkType::TEXT
    }

    async fn consume(
        &self,
        mut input: ChunkStream,
        _cancel: CancellationToken,
    ) -> Result<CollectedText, StageError> {
        let mut collected = CollectedText::default();

        while let Some(chunk) = input.next().await {
            let chunk = match chunk? {
                Chunk::Text(text) => text,
                other => {
                    return Err(StageError::sink_failed(format!(
                        "Expected text chunk, got '{}'",
                        other.chunk_type()
                    )));
                }
            };
            collected.text.push_str(chunk.text());
            collected.chunk_count += 1;
            collected.last_metadata = Some(chunk.metadata().clone());
        }

        Ok(collected)
    }
}
