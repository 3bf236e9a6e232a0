//! Pipeline definitions and the static chunk-type check.

use talewright_core::{ChunkType, Sink, Source, Transform};

/// The first incompatible link found in a chain.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{upstream} produces '{produced}' but {downstream} expects '{expected}'")]
pub struct TypeMismatch {
    pub upstream: String,
    pub downstream: String,
    pub produced: ChunkType,
    pub expected: ChunkType,
}

/// Source → transforms → sink.
pub struct PipelineDefinition<T> {
    pub(crate) source: Box<dyn Source>,
    pub(crate) transforms: Vec<Box<dyn Transform>>,
    pub(crate) sink: Box<dyn Sink<Output = T>>,
}

impl<T: Send> PipelineDefinition<T> {
    pub fn new(source: impl Source + 'static, sink: impl Sink<Output = T> + 'static) -> Self {
        Self {
            source: Box::new(source),
            transforms: Vec::new(),
            sink: Box::new(sink),
        }
    }

    /// Append one transform.
    pub fn then(mut self, transform: impl Transform + 'static) -> Self {
        self.transforms.push(Box::new(transform));
        self
    }

    /// Append already-boxed transforms, e.g. from a [`StageRegistry`](crate::StageRegistry).
    pub fn with_transforms(mut self, transforms: impl IntoIterator<Item = Box<dyn Transform>>) -> Self {
        self.transforms.extend(transforms);
        self
    }

    pub fn transform_count(&self) -> usize {
        self.transforms.len()
    }

    /// Check every link without invoking any stage's streaming logic.
    pub fn validate(&self) -> Result<(), TypeMismatch> {
        let mut produced = self.source.output_type();
        let mut upstream = "source".to_string();

        for (index, transform) in self.transforms.iter().enumerate() {
            let downstream = format!("transform #{}", index + 1);
            let expected = transform.input_type();
            if produced != expected {
                return Err(TypeMismatch {
                    upstream,
                    downstream,
                    produced,
                    expected,
                });
            }
            produced = transform.output_type();
            upstream = downstream;
        }

        let expected = self.sink.input_type();
        if produced != expected {
            return Err(TypeMismatch {
                upstream,
                downstream: "sink".into(),
                produced,
                expected,
            });
        }
        Ok(())
    }
}
