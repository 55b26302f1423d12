//! Analysis engine for Perito.
//!
//! Runs the six stages of the formal causal method against a local model:
//!
//! ```text
//! preceptivas -> tecnicas -> facultativas -> progresistas -> objetivos -> que_es
//! ```
//!
//! Each stage renders a prompt from the conjetura plus every upstream result,
//! asks the model, and pulls a JSON object out of whatever came back. A stage
//! that fails degrades to an empty result instead of stopping the pipeline.
//!
//! [`Pipeline`] drives the stages either all at once ([`Pipeline::run_all`])
//! or one at a time against a [`ReportStore`] entry ([`Pipeline::run_stage`]).

#![allow(clippy::missing_errors_doc)]

pub mod assembly;
pub mod executor;
pub mod extract;
pub mod pipeline;
pub mod prompt;
pub mod store;

#[cfg(test)]
mod test_support;

pub use assembly::{AssembledReport, assemble, assemble_at};
pub use executor::{ShapeMismatch, StageError, StageExecutor, StageRun};
pub use extract::{ExtractionFailed, JsonObject, extract};
pub use pipeline::{EagerRun, Pipeline, PipelineError, StageFetch, cancellable};
pub use prompt::{PromptContext, RenderError, TemplateError, render};
pub use store::{Report, ReportStore, StoreError};

pub use perito_providers::{
    self, InferenceClient, InferenceError, InferenceRequest, OllamaClient,
};
pub use perito_types::{
    AnalysisState, AnalysisSummary, Conjetura, ConjeturaError, Definition, METHOD_PHASES,
    Motivation, MotivationCategory, Objective, ReportId, StageId, StageOutput, StageStatus,
};
