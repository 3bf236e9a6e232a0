//! The pipeline runner: type check, cancellation scope, outcome mapping.
//!
//! One run is one lazily-chained stream pulled by exactly one sink
//! invocation. The runner never retries; retries belong to the generation
//! layer.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use talewright_core::{CancellationToken, FailureKind, StageError};
use tracing::{debug, info, warn};

use crate::definition::PipelineDefinition;
use crate::outcome::{PipelineOutcome, PipelineRunResult};

const UNEXPECTED_MESSAGE: &str = "Pipeline failed with an unexpected error.";

/// Executes [`PipelineDefinition`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct PipelineRunner;

impl PipelineRunner {
    pub fn new() -> Self {
        Self
    }

    /// Run a pipeline to completion, cancellation, or failure.
    ///
    /// `cancel` is the caller's signal. The runner derives a child scope
    /// from it for the stages and cancels that scope once the sink returns,
    /// so upstream production stops even when the sink quit early.
    pub async fn run<T: Send>(
        &self,
        definition: &PipelineDefinition<T>,
        cancel: &CancellationToken,
    ) -> PipelineRunResult<T> {
        if let Err(mismatch) = definition.validate() {
            warn!(%mismatch, "pipeline rejected before start");
            return PipelineRunResult::without_result(PipelineOutcome::failed(
                FailureKind::TypeMismatch,
                format!("Pipeline stages are incompatible: {mismatch}."),
            ));
        }

        debug!(transforms = definition.transform_count(), "pipeline run starting");

        let scope = cancel.child_token();

        let chained = std::panic::catch_unwind(AssertUnwindSafe(|| {
            let mut stream = definition.source.stream(scope.clone());
            for transform in &definition.transforms {
                stream = transform.transform(stream, scope.clone());
            }
            stream
        }));

        let stream = match chained {
            Ok(stream) => stream,
            Err(_) => {
                scope.cancel();
                warn!("pipeline stage panicked while chaining");
                return PipelineRunResult::without_result(PipelineOutcome::failed(
                    FailureKind::Unknown,
                    UNEXPECTED_MESSAGE,
                ));
            }
        };

        let consumed = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = AssertUnwindSafe(definition.sink.consume(stream, scope.clone())).catch_unwind() => Some(result),
        };

        // Stop any upstream work the sink left behind.
        scope.cancel();

        let result = match consumed {
            None => PipelineRunResult::without_result(PipelineOutcome::canceled()),
            Some(Ok(Ok(value))) => PipelineRunResult::completed(value),
            Some(Ok(Err(error))) => {
                PipelineRunResult::without_result(map_stage_error(error, cancel.is_cancelled()))
            }
            Some(Err(_)) => {
                warn!("pipeline stage panicked");
                PipelineRunResult::without_result(PipelineOutcome::failed(
                    FailureKind::Unknown,
                    UNEXPECTED_MESSAGE,
                ))
            }
        };

        info!(
            status = %result.outcome.status,
            failure_kind = %result.outcome.failure_kind,
            "pipeline run finished"
        );
        result
    }
}

fn map_stage_error(error: StageError, caller_canceled: bool) -> PipelineOutcome {
    match error {
        StageError::Blocked(message) => PipelineOutcome::blocked(message),
        StageError::Decode(message) => PipelineOutcome::failed(FailureKind::DecodeFailure, message),
        StageError::Failed { kind, message } => PipelineOutcome::failed(kind, message),
        StageError::Canceled if caller_canceled => PipelineOutcome::canceled(),
        StageError::Canceled => {
            warn!("stage reported cancellation the caller never requested");
            PipelineOutcome::failed(FailureKind::Unknown, UNEXPECTED_MESSAGE)
        }
        StageError::Unexpected { type_name, .. } => {
            warn!(error_type = type_name, "pipeline stage failed unexpectedly");
            PipelineOutcome::failed(
                FailureKind::Unknown,
                format!("Pipeline failed with unexpected error of type '{type_name}'."),
            )
        }
    }
}
