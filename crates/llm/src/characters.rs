//! Character roster tracking from narration.

use std::sync::Arc;

use futures::StreamExt;
use talewright_core::{
    CancellationToken, ChunkStream, ChunkType, GenerationSettings, TextGenerationService,
    Transform,
};

use crate::prompts;
use crate::state_stage::{StateStage, json_update, state_stream};

pub const NAME: &str = "CharacterTracker";

/// Asks the model for character upserts as a JSON update and merges the
/// whole update into the story state.
pub struct CharacterTracker {
    service: Arc<dyn TextGenerationService>,
    settings: GenerationSettings,
}

impl CharacterTracker {
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

impl Transform for CharacterTracker {
    fn input_type(&self) -> ChunkType {
        ChunkType::TEXT
    }

    fn output_type(&self) -> ChunkType {
        ChunkType::TEXT
    }

    fn transform(&self, input: ChunkStream, cancel: CancellationToken) -> ChunkStream {
        let stage = StateStage {
            name: NAME,
            prompt: prompts::characters,
            interpret: json_update,
        };
        state_stream(stage, input, self.service.clone(), self.settings.clone(), cancel).boxed()
    }
}
