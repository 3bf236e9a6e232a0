//! Text accumulator: batches small text chunks into larger ones.

use async_stream::try_stream;
use futures::{Stream, StreamExt};
use talewright_core::{
    CancellationToken, Chunk, ChunkMetadata, ChunkStream, ChunkType, StageBuildError, StageError,
    Transform,
};

/// Flush thresholds. A buffer flushes as soon as any configured one is met.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccumulatorThresholds {
    pub max_utf8_bytes: Option<usize>,
    /// Counted in Unicode scalar values.
    pub max_chars: Option<usize>,
    pub max_chunks: Option<usize>,
}

impl AccumulatorThresholds {
    fn validate(self) -> Result<Self, StageBuildError> {
        let invalid = |reason: String| StageBuildError::InvalidArgument {
            stage: "accumulate".into(),
            reason,
        };

        if self.max_utf8_bytes.is_none() && self.max_chars.is_none() && self.max_chunks.is_none() {
            return Err(invalid("at least one threshold must be provided".into()));
        }
        for (name, value) in [
            ("max_utf8_bytes", self.max_utf8_bytes),
            ("max_chars", self.max_chars),
            ("max_chunks", self.max_chunks),
        ] {
            if value == Some(0) {
                return Err(invalid(format!("{name} must be greater than 0")));
            }
        }
        Ok(self)
    }

    fn reached(&self, buffer: &Buffer) -> bool {
        let hit = |limit: Option<usize>, current: usize| limit.is_some_and(|max| current >= max);
        hit(self.max_utf8_bytes, buffer.text.len())
            || hit(self.max_chars, buffer.chars)
            || hit(self.max_chunks, buffer.metadata.len())
    }
}

#[derive(Default)]
struct Buffer {
    text: String,
    chars: usize,
    metadata: Vec<ChunkMetadata>,
}

impl Buffer {
    fn push(&mut self, text: &str, metadata: &ChunkMetadata) {
        self.text.push_str(text);
        self.chars += text.chars().count();
        self.metadata.push(metadata.clone());
    }

    fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    fn take(&mut self) -> Chunk {
        let buffer = std::mem::take(self);
        Chunk::text(buffer.text, ChunkMetadata::merge(&buffer.metadata))
    }
}

/// Concatenates text chunks until a threshold is met, then emits one chunk
/// carrying the merged metadata of everything it contains. Any remainder is
/// flushed when the input ends.
#[derive(Debug, Clone, Copy)]
pub struct TextAccumulator {
    thresholds: AccumulatorThresholds,
}

impl TextAccumulator {
    pub fn new(thresholds: AccumulatorThresholds) -> Result<Self, StageBuildError> {
        Ok(Self {
            thresholds: thresholds.validate()?,
        })
    }

    pub fn thresholds(&self) -> AccumulatorThresholds {
        self.thresholds
    }
}

impl Transform for TextAccumulator {
    fn input_type(&self) -> ChunkType {
        ChunkType::TEXT
    }

    fn output_type(&self) -> ChunkType {
        ChunkType::TEXT
    }

    fn transform(&self, input: ChunkStream, _cancel: CancellationToken) -> ChunkStream {
        accumulate_stream(input, self.thresholds).boxed()
    }
}

fn accumulate_stream(
    input: ChunkStream,
    thresholds: AccumulatorThresholds,
) -> impl Stream<Item = Result<Chunk, StageError>> + Send + 'static {
    try_stream! {
        let mut buffer = Buffer::default();

        for await chunk in input {
            let chunk = chunk?.into_text()?;
            buffer.push(chunk.text(), chunk.metadata());

            if thresholds.reached(&buffer) {
                yield buffer.take();
            }
        }

        if !buffer.is_empty() {
            yield buffer.take();
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::stream;

    use super::*;

    fn texts(chunks: &[Chunk]) -> Vec<String> {
        chunks
            .iter()
            .map(|c| c.clone().into_text().unwrap().text().to_string())
            .collect()
    }

    async fn run(thresholds: AccumulatorThresholds, inputs: Vec<Chunk>) -> Vec<Chunk> {
        let input = stream::iter(inputs.into_iter().map(Ok)).boxed();
        TextAccumulator::new(thresholds)
            .unwrap()
            .transform(input, CancellationToken::new())
            .map(|r| r.unwrap())
            .collect()
            .await
    }

    #[test]
    fn requires_a_threshold() {
        let err = TextAccumulator::new(AccumulatorThresholds::default()).unwrap_err();
        assert!(matches!(err, StageBuildError::InvalidArgument { .. }));
    }

    #[test]
    fn rejects_zero_threshold() {
        let err = TextAccumulator::new(AccumulatorThresholds {
            max_chars: Some(0),
            ..Default::default()
        })
        .unwrap_err();
        assert!(err.to_string().contains("max_chars"));
    }

    #[tokio::test]
    async fn max_chunks_three_over_seven_inputs() {
        let inputs: Vec<Chunk> = (0..7)
            .map(|i| {
                let metadata = ChunkMetadata::empty()
                    .with_annotation(format!("k{i}"), i.to_string())
                    .unwrap();
                Chunk::text(i.to_string(), metadata)
            })
            .collect();

        let out = run(
            AccumulatorThresholds {
                max_chunks: Some(3),
                ..Default::default()
            },
            inputs,
        )
        .await;

        assert_eq!(texts(&out), vec!["012", "345", "6"]);

        let first = out[0].metadata().annotations();
        assert_eq!(first.len(), 3);
        assert_eq!(first.get("k0").map(String::as_str), Some("0"));
        assert_eq!(first.get("k2").map(String::as_str), Some("2"));
        assert_eq!(out[2].metadata().annotation("k6"), Some("6"));
    }

    #[tokio::test]
    async fn counts_scalars_not_bytes() {
        let inputs = vec![
            Chunk::text("é", ChunkMetadata::empty()),
            Chunk::text("é", ChunkMetadata::empty()),
            Chunk::text("é", ChunkMetadata::empty()),
        ];

        let by_chars = run(
            AccumulatorThresholds {
                max_chars: Some(2),
                ..Default::default()
            },
            inputs.clone(),
        )
        .await;
        assert_eq!(texts(&by_chars), vec!["éé", "é"]);

        let by_bytes = run(
            AccumulatorThresholds {
                max_utf8_bytes: Some(2),
                ..Default::default()
            },
            inputs,
        )
        .await;
        assert_eq!(texts(&by_bytes), vec!["é", "é", "é"]);
    }

    #[tokio::test]
    async fn later_annotation_wins_on_merge() {
        let a = ChunkMetadata::empty().with_annotation("turn", "1").unwrap();
        let b = ChunkMetadata::empty().with_annotation("turn", "2").unwrap();
        let out = run(
            AccumulatorThresholds {
                max_chunks: Some(5),
                ..Default::default()
            },
            vec![Chunk::text("a", a), Chunk::text("b", b)],
        )
        .await;

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].metadata().annotation("turn"), Some("2"));
    }
}
