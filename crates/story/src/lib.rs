//! # Talewright Story
//!
//! Narrative memory threaded through a pipeline run: the versioned
//! [`StoryState`] aggregate, the [`StoryStateUpdate`] documents LLM stages
//! produce, the pure [`apply_update`] merge, and the [`annotations`] codec
//! that carries state inside chunk metadata between stages.

pub mod annotations;
pub mod merge;
pub mod model;
pub mod update;

pub use merge::apply_update;
pub use model::{
    CharacterRecord, InventoryItem, InventoryState, Provenance, Relationship, StoryState,
};
pub use update::{InventoryItemUpdate, InventoryOperation, StoryStateUpdate, UpdateParseError};

/// Errors from the story-state layer.
#[derive(Debug, thiserror::Error)]
pub enum StoryError {
    #[error("story state serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("metadata error: {0}")]
    Metadata(#[from] talewright_core::MetadataError),
}
