use async_stream::try_stream;
use futures::{Stream, StreamExt};
use talewright_core::{
    CancellationToken, Chunk, ChunkStream, ChunkType, StageBuildError, StageError, Transform,
};

/// Sets one annotation on every text chunk.
#[derive(Debug, Clone)]
pub struct Annotate {
    key: String,
    value: String,
}

impl Annotate {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Result<Self, StageBuildError> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(StageBuildError::InvalidArgument {
                stage: "annotate".into(),
                reason: "annotation key cannot be empty".into(),
            });
        }
        Ok(Self {
            key,
            value: value.into(),
        })
    }
}

impl Transform for Annotate {
    fn input_type(&self) -> ChunkType {
        ChunkType::TEXT
    }

    fn output_type(&self) -> ChunkType {
        ChunkType::TEXT
    }

    fn transform(&self, input: ChunkStream, _cancel: CancellationToken) -> ChunkStream {
        annotate_stream(input, self.key.clone(), self.value.clone()).boxed()
    }
}

fn annotate_stream(
    input: ChunkStream,
    key: String,
    value: String,
) -> impl Stream<Item = Result<Chunk, StageError>> + Send + 'static {
    try_stream! {
        for await chunk in input {
            let chunk = chunk?.into_text()?;
            let metadata = chunk
                .metadata()
                .with_annotation(key.as_str(), value.as_str())
                .map_err(|e| StageError::transform_failed(e.to_string()))?;
            yield Chunk::from(chunk).with_metadata(metadata);
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::stream;
    use talewright_core::ChunkMetadata;

    use super::*;

    #[test]
    fn empty_key_is_rejected_at_construction() {
        assert!(matches!(
            Annotate::new("", "x"),
            Err(StageBuildError::InvalidArgument { .. })
        ));
    }

    #[tokio::test]
    async fn sets_annotation_and_keeps_text() {
        let input = stream::iter(vec![Ok(Chunk::text("hello", ChunkMetadata::empty()))]).boxed();
        let mut out = Annotate::new("talewright.session_id", "s-1")
            .unwrap()
            .transform(input, CancellationToken::new());

        let chunk = out.next().await.unwrap().unwrap();
        assert_eq!(chunk.metadata().annotation("talewright.session_id"), Some("s-1"));
        assert_eq!(chunk.into_text().unwrap().text(), "hello");
    }
}
