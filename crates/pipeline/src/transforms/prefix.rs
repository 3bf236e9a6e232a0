use async_stream::try_stream;
use futures::{Stream, StreamExt};
use talewright_core::{CancellationToken, Chunk, ChunkStream, ChunkType, StageError, Transform};

/// Prepends a fixed string to every text chunk.
#[derive(Debug, Clone)]
pub struct PrefixText {
    prefix: String,
}

impl PrefixText {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Transform for PrefixText {
    fn input_type(&self) -> ChunkType {
        ChunkType::TEXT
    }

    fn output_type(&self) -> ChunkType {
        ChunkType::TEXT
    }

    fn transform(&self, input: ChunkStream, _cancel: CancellationToken) -> ChunkStream {
        prefix_stream(input, self.prefix.clone()).boxed()
    }
}

fn prefix_stream(
    input: ChunkStream,
    prefix: String,
) -> impl Stream<Item = Result<Chunk, StageError>> + Send + 'static {
    try_stream! {
        for await chunk in input {
            let chunk = chunk?.into_text()?;
            yield Chunk::text(format!("{prefix}{}", chunk.text()), chunk.metadata().clone());
        }
    }
}
