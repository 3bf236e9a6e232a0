//! `talewright run`: Run a narration pipeline.

use std::io::Read;
use std::path::PathBuf;

use talewright_config::AppConfig;
use talewright_core::Transform;
use talewright_pipeline::{
    Annotate, CollectedText, DecodeBytesToText, PipelineDefinition, PipelineRunner, StageRegistry,
    TextCollectingSink, TextInput, TextSource,
};
use talewright_story::{StoryState, annotations};
use tracing::info;
use uuid::Uuid;

use super::{CommandResult, cancel_on_ctrl_c, default_service, registry};

pub struct RunArgs {
    pub stages: Vec<String>,
    pub text: Option<String>,
    pub input: Option<PathBuf>,
    pub encoding: Option<String>,
    pub session: Option<String>,
    pub show_state: bool,
}

pub async fn run(config: &AppConfig, args: RunArgs) -> CommandResult {
    let registry = registry(default_service(config)?);
    let stages = if args.stages.is_empty() {
        config.pipeline.stages.clone()
    } else {
        args.stages
    };
    let session = args
        .session
        .unwrap_or_else(|| config.pipeline.default_session_id.clone());

    let input = match (args.text, args.input) {
        (Some(text), _) => TextInput::Complete(text),
        (None, Some(path)) => {
            let bytes = std::fs::read(&path)
                .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
            match args.encoding {
                Some(encoding) => TextInput::Bytes {
                    chunks: vec![bytes],
                    encoding: Some(encoding),
                },
                None => TextInput::Complete(String::from_utf8(bytes).map_err(|_| {
                    format!("{} is not UTF-8; pass --encoding", path.display())
                })?),
            }
        }
        (None, None) => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            TextInput::Complete(text)
        }
    };

    let definition = build_definition(&registry, input, &stages, &session)?;
    info!(stages = ?stages, session = %session, "Running pipeline");

    let run = PipelineRunner::new().run(&definition, &cancel_on_ctrl_c()).await;
    let outcome = run.outcome;

    if let Some(collected) = &run.result {
        println!("{}", collected.text);
        if args.show_state {
            print_state(collected)?;
        }
    }

    if outcome.is_completed() {
        eprintln!("Outcome: completed");
        Ok(())
    } else {
        let message = outcome.safe_message.unwrap_or_default();
        eprintln!("Outcome: {} ({}) {message}", outcome.status, outcome.failure_kind);
        Err(format!("Pipeline {}: {message}", outcome.status).into())
    }
}

/// Source, decode when the input is bytes, turn annotations, then `stages`.
pub fn build_definition(
    registry: &StageRegistry,
    input: TextInput,
    stages: &[String],
    session: &str,
) -> talewright_core::Result<PipelineDefinition<CollectedText>> {
    let mut transforms: Vec<Box<dyn Transform>> = Vec::new();
    if matches!(input, TextInput::Bytes { .. }) {
        transforms.push(Box::new(DecodeBytesToText::new()));
    }

    let run_id = Uuid::new_v4().to_string();
    let turn_id = Uuid::new_v4().to_string();
    for (key, value) in [
        (annotations::SESSION_ID, session),
        (annotations::RUN_ID, run_id.as_str()),
        (annotations::TURN_ID, turn_id.as_str()),
        (annotations::TURN_INDEX, "0"),
    ] {
        transforms.push(Box::new(Annotate::new(key, value)?));
    }
    transforms.extend(registry.build_all(stages)?);

    Ok(PipelineDefinition::new(TextSource::new(input), TextCollectingSink::new())
        .with_transforms(transforms))
}

fn print_state(collected: &CollectedText) -> talewright_core::Result<()> {
    let state = collected
        .last_metadata
        .as_ref()
        .and_then(|m| m.annotation(annotations::STORY_STATE_JSON))
        .and_then(StoryState::from_json);
    match state {
        Some(state) => println!("{}", serde_json::to_string_pretty(&state)?),
        None => eprintln!("No story state was produced (add an LLM stage such as `summarize`)."),
    }
    Ok(())
}
