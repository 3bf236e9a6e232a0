//! # Talewright Pipeline
//!
//! A small dataflow engine: one [`Source`](talewright_core::Source), an
//! ordered list of [`Transform`](talewright_core::Transform)s and one
//! [`Sink`](talewright_core::Sink), checked for chunk-type compatibility
//! before anything runs.
//!
//! ```text
//! TextSource ──▶ decode ──▶ accumulate ──▶ summarize ──▶ TextCollectingSink
//! ```
//!
//! [`PipelineRunner::run`] owns cancellation for the run and maps every
//! failure onto a [`PipelineOutcome`] that is safe to show a user.

pub mod definition;
pub mod outcome;
pub mod registry;
pub mod runner;
pub mod text;
pub mod transforms;

pub use definition::{PipelineDefinition, TypeMismatch};
pub use outcome::{PipelineOutcome, PipelineRunResult, PipelineStatus};
pub use registry::{StageFactory, StageParams, StageRegistry, StageSpec};
pub use runner::PipelineRunner;
pub use text::{CollectedText, TextCollectingSink, TextInput, TextSource};
pub use transforms::{
    AccumulatorThresholds, Annotate, DecodeBytesToText, PrefixText, TextAccumulator, TextEncoding,
};
