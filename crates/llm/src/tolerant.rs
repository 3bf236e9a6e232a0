//! Best-effort generation for pipeline stages.
//!
//! A provider failure must never abort the stream: the stage logs it with
//! the turn context and passes its input through. Cancellation is the one
//! failure that propagates.

use std::fmt;

use talewright_core::{
    CancellationToken, ChunkMetadata, GenerationRequest, ProviderError, StageError,
    TextGenerationService,
};
use talewright_story::annotations;
use tracing::warn;

/// Turn identifiers read from chunk annotations, `?` when absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnContext<'a> {
    pub session_id: &'a str,
    pub turn_id: &'a str,
    pub turn_index: &'a str,
    pub run_id: &'a str,
}

impl<'a> TurnContext<'a> {
    pub fn from_metadata(metadata: &'a ChunkMetadata) -> Self {
        let get = |key| metadata.annotation(key).unwrap_or("?");
        Self {
            session_id: get(annotations::SESSION_ID),
            turn_id: get(annotations::TURN_ID),
            turn_index: get(annotations::TURN_INDEX),
            run_id: get(annotations::RUN_ID),
        }
    }
}

impl fmt::Display for TurnContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "session_id={}, turn_id={}, turn_index={}, run_id={}",
            self.session_id, self.turn_id, self.turn_index, self.run_id
        )
    }
}

/// Generate text, or `Ok(None)` when the provider fails.
pub async fn try_generate_text(
    service: &dyn TextGenerationService,
    request: &GenerationRequest,
    transform_name: &str,
    metadata: &ChunkMetadata,
    cancel: &CancellationToken,
) -> Result<Option<String>, StageError> {
    if cancel.is_cancelled() {
        return Err(StageError::Canceled);
    }

    match service.generate(request, cancel).await {
        Ok(response) => Ok(Some(response.text)),
        Err(ProviderError::Canceled) => Err(StageError::Canceled),
        Err(_) if cancel.is_cancelled() => Err(StageError::Canceled),
        Err(err) => {
            let context = TurnContext::from_metadata(metadata);
            warn!(
                transform = transform_name,
                provider = service.name(),
                session_id = context.session_id,
                turn_id = context.turn_id,
                turn_index = context.turn_index,
                run_id = context.run_id,
                error = %err,
                "Provider call failed"
            );
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedService;

    #[tokio::test]
    async fn success_returns_text() {
        let service = ScriptedService::new().reply("hello");
        let text = try_generate_text(
            &service,
            &GenerationRequest::new("p"),
            "Test",
            &ChunkMetadata::empty(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(text.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn failure_becomes_no_result() {
        let service = ScriptedService::new().fail(ProviderError::Network("down".into()));
        let text = try_generate_text(
            &service,
            &GenerationRequest::new("p"),
            "Test",
            &ChunkMetadata::empty(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(text, None);
    }

    #[tokio::test]
    async fn cancellation_propagates() {
        let service = ScriptedService::new().fail(ProviderError::Canceled);
        let err = try_generate_text(
            &service,
            &GenerationRequest::new("p"),
            "Test",
            &ChunkMetadata::empty(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StageError::Canceled));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let service = ScriptedService::new().reply("unused");
        let err = try_generate_text(
            &service,
            &GenerationRequest::new("p"),
            "Test",
            &ChunkMetadata::empty(),
            &cancel,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StageError::Canceled));
        assert_eq!(service.calls(), 0);
    }

    #[test]
    fn context_renders_missing_values_as_question_marks() {
        let metadata = ChunkMetadata::empty()
            .with_annotation(annotations::SESSION_ID, "s1")
            .unwrap()
            .with_annotation(annotations::TURN_INDEX, "4")
            .unwrap();
        assert_eq!(
            TurnContext::from_metadata(&metadata).to_string(),
            "session_id=s1, turn_id=?, turn_index=4, run_id=?"
        );
    }
}
