//! Rolling story summary.

use std::sync::Arc;

use futures::StreamExt;
use talewright_core::{
    CancellationToken, ChunkStream, ChunkType, GenerationSettings, TextGenerationService,
    Transform,
};

use crate::prompts;
use crate::state_stage::{StateStage, state_stream, summary_update};

pub const NAME: &str = "StorySummary";

/// Asks the model for an updated summary of each chunk and merges it into
/// the story state. The chunk text passes through unchanged.
pub struct StorySummary {
    service: Arc<dyn TextGenerationService>,
    settings: GenerationSettings,
}

impl StorySummary {
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

impl Transform for StorySummary {
    fn input_type(&self) -> ChunkType {
        ChunkType::TEXT
    }

    fn output_type(&self) -> ChunkType {
        ChunkType::TEXT
    }

    fn transform(&self, input: ChunkStream, cancel: CancellationToken) -> ChunkStream {
        let stage = StateStage {
            name: NAME,
            prompt: prompts::summary,
            interpret: summary_update,
        };
        state_stream(stage, input, self.service.clone(), self.settings.clone(), cancel).boxed()
    }
}
