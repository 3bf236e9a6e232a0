//! Narration rewriting.

use std::sync::Arc;

use async_stream::try_stream;
use futures::{Stream, StreamExt};
use talewright_core::{
    CancellationToken, Chunk, ChunkStream, ChunkType, GenerationRequest, GenerationSettings,
    StageError, TextGenerationService, Transform,
};
use talewright_story::annotations;

use crate::prompts;
use crate::tolerant::try_generate_text;

pub const NAME: &str = "RewriteNarration";

/// Replaces each chunk's text with a cleaned-up rewrite.
///
/// The text as first seen is kept under [`annotations::ORIGINAL_TEXT`];
/// later rewrites do not overwrite it. When the model yields nothing usable
/// the chunk text passes through unchanged. Story state is not touched.
pub struct RewriteNarration {
    service: Arc<dyn TextGenerationService>,
    settings: GenerationSettings,
}

impl RewriteNarration {
    pub fn new(service: Arc<dyn TextGenerationService>) -> Self {
        Self {
            service,
            settings: GenerationSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }
}

impl Transform for RewriteNarration {
    fn input_type(&self) -> ChunkType {
        ChunkType::TEXT
    }

    fn output_type(&self) -> ChunkType {
        ChunkType::TEXT
    }

    fn transform(&self, input: ChunkStream, cancel: CancellationToken) -> ChunkStream {
        rewrite_stream(input, self.service.clone(), self.settings.clone(), cancel).boxed()
    }
}

fn rewrite_stream(
    input: ChunkStream,
    service: Arc<dyn TextGenerationService>,
    settings: GenerationSettings,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<Chunk, StageError>> + Send + 'static {
    try_stream! {
        for await chunk in input {
            let chunk = chunk?.into_text()?;

            let original = annotations::original_text(chunk.metadata())
                .unwrap_or(chunk.text())
                .to_string();
            let metadata = chunk
                .metadata()
                .with_annotation(annotations::ORIGINAL_TEXT, original)
                .map_err(StageError::unexpected)?;

            let request = GenerationRequest::new(prompts::rewrite(chunk.text()))
                .with_settings(settings.clone());
            let generated = try_generate_text(
                service.as_ref(),
                &request,
                NAME,
                chunk.metadata(),
                &cancel,
            )
            .await?;

            let text = match generated {
                Some(text) if !text.trim().is_empty() => text,
                _ => chunk.text().to_string(),
            };
            yield Chunk::text(text, metadata);
        }
    }
}
