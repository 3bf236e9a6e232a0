//! # Talewright LLM stages
//!
//! Pipeline transforms that call a [`TextGenerationService`]:
//!
//! | stage name | transform | effect |
//! |---|---|---|
//! | `rewrite` | [`RewriteNarration`] | replaces chunk text, keeps the original |
//! | `summarize` | [`StorySummary`] | updates the rolling summary |
//! | `track-inventory` | [`InventoryTracker`] | merges inventory changes |
//! | `track-characters` | [`CharacterTracker`] | merges character upserts |
//!
//! Every stage is best-effort: provider failures are logged through
//! [`tolerant::try_generate_text`] and the chunk passes through.

pub mod characters;
pub mod inventory;
pub mod prompts;
pub mod rewrite;
pub mod summary;
pub mod tolerant;

mod state_stage;

use std::sync::Arc;

pub use characters::CharacterTracker;
pub use inventory::InventoryTracker;
pub use rewrite::RewriteNarration;
pub use summary::StorySummary;
pub use tolerant::{TurnContext, try_generate_text};

use talewright_core::{GenerationSettings, StageBuildError, TextGenerationService};
use talewright_pipeline::{StageParams, StageRegistry};

/// Register the LLM stages against `service`.
///
/// Each accepts optional `temperature` and `max_tokens` parameters, e.g.
/// `summarize:temperature=0.2,max_tokens=200`.
pub fn register_stages(registry: &mut StageRegistry, service: Arc<dyn TextGenerationService>) {
    let svc = service.clone();
    registry.register("rewrite", move |params| {
        Ok(Box::new(
            RewriteNarration::new(svc.clone()).with_settings(settings_from(params)?),
        ))
    });

    let svc = service.clone();
    registry.register("summarize", move |params| {
        Ok(Box::new(
            StorySummary::new(svc.clone()).with_settings(settings_from(params)?),
        ))
    });

    let svc = service.clone();
    registry.register("track-inventory", move |params| {
        Ok(Box::new(
            InventoryTracker::new(svc.clone()).with_settings(settings_from(params)?),
        ))
    });

    registry.register("track-characters", move |params| {
        Ok(Box::new(
            CharacterTracker::new(service.clone()).with_settings(settings_from(params)?),
        ))
    });
}

fn settings_from(params: &StageParams) -> Result<GenerationSettings, StageBuildError> {
    Ok(GenerationSettings {
        temperature: params.get_f32("temperature")?,
        max_output_tokens: params.get_u32("max_tokens")?,
    })
}


#[cfg(test)]
mod tests {
    use talewright_core::{Chunk, ChunkMetadata, ChunkType};

    use super::*;
    use crate::test_support::{ScriptedService, run_transform};

    #[test]
    fn registers_all_llm_stages() {
        let mut registry = StageRegistry::builtin();
        register_stages(&mut registry, Arc::new(ScriptedService::new()));
        for name in ["rewrite", "summarize", "track-inventory", "track-characters"] {
            assert!(registry.contains(name), "{name} missing");
            let stage = registry.build(name).unwrap();
            assert_eq!(stage.input_type(), ChunkType::TEXT);
        }
    }

    #[tokio::test]
    async fn stage_parameters_become_settings() {
        let service = Arc::new(ScriptedService::new().reply("s"));
        let mut registry = StageRegistry::new();
        register_stages(&mut registry, service.clone());

        let stage = registry.build("summarize:temperature=0.2,max_tokens=50").unwrap();
        run_transform(stage.as_ref(), vec![Chunk::text("x", ChunkMetadata::empty())])
            .await
            .unwrap();

        let settings = &service.requests()[0].settings;
        assert_eq!(settings.temperature, Some(0.2));
        assert_eq!(settings.max_output_tokens, Some(50));
    }

    #[test]
    fn bad_parameters_fail_to_build() {
        let mut registry = StageRegistry::new();
        register_stages(&mut registry, Arc::new(ScriptedService::new()));
        assert!(matches!(
            registry.build("rewrite:temperature=hot"),
            Err(StageBuildError::InvalidArgument { .. })
        ));
    }
}
