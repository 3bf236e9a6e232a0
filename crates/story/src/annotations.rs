//! Chunk-metadata codec for story state and turn context.

use talewright_core::ChunkMetadata;
use tracing::warn;

use crate::StoryError;
use crate::model::StoryState;

pub const STORY_STATE_JSON: &str = "talewright.story_state_json";
pub const STORY_STATE_SCHEMA_VERSION: &str = "talewright.story_state_schema_version";
pub const SCHEMA_VERSION_VALUE: &str = "story-state/v1";
pub const ORIGINAL_TEXT: &str = "talewright.original_text";
pub const SESSION_ID: &str = "talewright.session_id";
pub const TURN_ID: &str = "talewright.turn_id";
pub const TURN_INDEX: &str = "talewright.turn_index";
pub const RUN_ID: &str = "talewright.run_id";

/// The embedded state, or a fresh one for the chunk's session.
///
/// Unreadable embedded JSON is treated as absent.
pub fn read_or_create(metadata: &ChunkMetadata, transform_name: &str) -> StoryState {
    if let Some(json) = metadata.annotation(STORY_STATE_JSON) {
        match StoryState::from_json(json) {
            Some(state) => return state,
            None => warn!(
                transform = transform_name,
                "embedded story state is unreadable, starting fresh"
            ),
        }
    }
    StoryState::empty(session_id(metadata), transform_name)
}

/// New metadata carrying `state` and its schema version.
pub fn write(metadata: &ChunkMetadata, state: &StoryState) -> Result<ChunkMetadata, StoryError> {
    let json = state.to_json()?;
    Ok(metadata
        .with_annotation(STORY_STATE_JSON, json)?
        .with_annotation(STORY_STATE_SCHEMA_VERSION, SCHEMA_VERSION_VALUE)?)
}

/// Session id annotation, `default` when absent.
pub fn session_id(metadata: &ChunkMetadata) -> &str {
    metadata.annotation(SESSION_ID).unwrap_or("default")
}

pub fn turn_id(metadata: &ChunkMetadata) -> Option<&str> {
    metadata.annotation(TURN_ID)
}

pub fn run_id(metadata: &ChunkMetadata) -> Option<&str> {
    metadata.annotation(RUN_ID)
}

pub fn original_text(metadata: &ChunkMetadata) -> Option<&str> {
    metadata.annotation(ORIGINAL_TEXT)
}

/// Turn index annotation when it is a non-negative integer.
pub fn turn_index(metadata: &ChunkMetadata) -> Option<u32> {
    metadata.annotation(TURN_INDEX)?.trim().parse().ok()
}
