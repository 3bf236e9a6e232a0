//! Run outcomes. Nothing in here ever carries raw error text from a stage
//! that failed unexpectedly.

use serde::Serialize;
use talewright_core::FailureKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Completed,
    Failed,
    Canceled,
    Blocked,
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Canceled => write!(f, "canceled"),
            Self::Blocked => write!(f, "blocked"),
        }
    }
}

/// Classified result of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineOutcome {
    pub status: PipelineStatus,
    pub failure_kind: FailureKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safe_message: Option<String>,
}

impl PipelineOutcome {
    pub fn completed() -> Self {
        Self {
            status: PipelineStatus::Completed,
            failure_kind: FailureKind::None,
            safe_message: None,
        }
    }

    pub fn canceled() -> Self {
        Self {
            status: PipelineStatus::Canceled,
            failure_kind: FailureKind::None,
            safe_message: Some("Canceled".into()),
        }
    }

    pub fn blocked(message: impl Into<String>) -> Self {
        Self {
            status: PipelineStatus::Blocked,
            failure_kind: FailureKind::None,
            safe_message: Some(message.into()),
        }
    }

    pub fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            status: PipelineStatus::Failed,
            failure_kind: kind,
            safe_message: Some(message.into()),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == PipelineStatus::Completed
    }
}

/// Outcome plus the sink's result, present only when the run completed.
#[derive(Debug, Clone)]
pub struct PipelineRunResult<T> {
    pub outcome: PipelineOutcome,
    pub result: Option<T>,
}

impl<T> PipelineRunResult<T> {
    pub fn completed(result: T) -> Self {
        Self {
            outcome: PipelineOutcome::completed(),
            result: Some(result),
        }
    }

    pub fn without_result(outcome: PipelineOutcome) -> Self {
        Self {
            outcome,
            result: None,
        }
    }
}
