//! The loop shared by stages that fold generated updates into story state.

use std::sync::Arc;

use async_stream::try_stream;
use chrono::Utc;
use futures::Stream;
use talewright_core::{
    CancellationToken, Chunk, ChunkMetadata, ChunkStream, GenerationRequest, GenerationSettings,
    StageError, TextGenerationService,
};
use talewright_story::{StoryState, StoryStateUpdate, annotations, apply_update};
use tracing::warn;

use crate::tolerant::{TurnContext, try_generate_text};

/// What distinguishes one state stage from another.
#[derive(Clone, Copy)]
pub(crate) struct StateStage {
    pub name: &'static str,
    pub prompt: fn(Option<&str>, &str) -> String,
    /// Turn non-blank generated text into an update, or `None` to skip the merge.
    pub interpret: fn(&str, &'static str, &ChunkMetadata) -> Option<StoryStateUpdate>,
}

/// Generated text is the new summary.
pub(crate) fn summary_update(
    text: &str,
    _name: &'static str,
    _metadata: &ChunkMetadata,
) -> Option<StoryStateUpdate> {
    Some(StoryStateUpdate::summary(text))
}

/// Generated text is a JSON update document.
pub(crate) fn json_update(
    text: &str,
    name: &'static str,
    metadata: &ChunkMetadata,
) -> Option<StoryStateUpdate> {
    match StoryStateUpdate::parse(text) {
        Ok(update) => Some(update),
        Err(err) => {
            let context = TurnContext::from_metadata(metadata);
            warn!(
                transform = name,
                session_id = context.session_id,
                turn_id = context.turn_id,
                turn_index = context.turn_index,
                run_id = context.run_id,
                error = %err,
                "Could not parse JSON update"
            );
            None
        }
    }
}

pub(crate) fn state_stream(
    stage: StateStage,
    input: ChunkStream,
    service: Arc<dyn TextGenerationService>,
    settings: GenerationSettings,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<Chunk, StageError>> + Send + 'static {
    try_stream! {
        let mut running: Option<StoryState> = None;

        for await chunk in input {
            let chunk = chunk?.into_text()?;

            // Never regress below a newer state embedded upstream.
            let incoming = annotations::read_or_create(chunk.metadata(), stage.name);
            let current = match running.take() {
                Some(state) if state.version >= incoming.version => state,
                _ => incoming,
            };

            let prompt = (stage.prompt)(current.summary.as_deref(), chunk.text());
            let request = GenerationRequest::new(prompt).with_settings(settings.clone());
            let generated = try_generate_text(
                service.as_ref(),
                &request,
                stage.name,
                chunk.metadata(),
                &cancel,
            )
            .await?;

            let update = match generated.as_deref() {
                Some(text) if !text.trim().is_empty() => {
                    (stage.interpret)(text, stage.name, chunk.metadata())
                }
                _ => None,
            };
            let next = match update {
                Some(update) => apply_update(&current, &update, stage.name, Utc::now()),
                None => current,
            };

            let metadata = annotations::write(chunk.metadata(), &next).map_err(StageError::unexpected)?;
            running = Some(next);
            yield Chunk::Text(chunk).with_metadata(metadata);
        }
    }
}
