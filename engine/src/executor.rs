//! One stage: render, infer, extract, validate.
//!
//! Everything after rendering is contained here. A failed call, unparseable
//! reply or wrong shape yields the caller's default plus the [`StageError`]
//! that caused it; only [`RenderError`] escapes.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use perito_providers::{InferenceClient, InferenceError, InferenceRequest};
use perito_types::{
    AnalysisState, Definition, Motivation, Objective, StageId, StageOutput, StageStatus,
};

use crate::extract::{ExtractionFailed, JsonObject, extract};
use crate::prompt::{PromptContext, RenderError, render, system_instruction};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeMismatch {
    #[error("response has no \"{key}\" key")]
    MissingKey { key: &'static str },
    #[error("\"{key}\" has the wrong shape: {reason}")]
    WrongShape { key: &'static str, reason: String },
}

/// Why a stage fell back to its default.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error(transparent)]
    Extraction(#[from] ExtractionFailed),
    #[error(transparent)]
    Shape(#[from] ShapeMismatch),
}

/// Outcome of one stage execution.
#[derive(Debug, Clone, PartialEq)]
pub struct StageRun {
    pub output: StageOutput,
    /// Present when `output` is the caller's default.
    pub failure: Option<StageError>,
}

impl StageRun {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }

    #[must_use]
    pub fn used_default(&self) -> bool {
        self.failure.is_some()
    }

    #[must_use]
    pub fn status(&self) -> StageStatus {
        if self.succeeded() {
            StageStatus::Completed
        } else {
            StageStatus::Degraded
        }
    }
}

/// Read the stage's result key out of an extracted object.
pub fn parse_output(stage: StageId, object: &JsonObject) -> Result<StageOutput, ShapeMismatch> {
    let key = stage.result_key();
    let value = object.get(key).ok_or(ShapeMismatch::MissingKey { key })?;
    let wrong_shape = |e: serde_json::Error| ShapeMismatch::WrongShape {
        key,
        reason: e.to_string(),
    };

    match stage {
        StageId::Objetivos => Vec::<Objective>::deserialize(value)
            .map(StageOutput::Objectives)
            .map_err(wrong_shape),
        StageId::QueEs => Definition::deserialize(value)
            .map(StageOutput::Definition)
            .map_err(wrong_shape),
        StageId::Preceptivas
        | StageId::Tecnicas
        | StageId::Facultativas
        | StageId::Progresistas => Vec::<Motivation>::deserialize(value)
            .map(StageOutput::Motivations)
            .map_err(wrong_shape),
    }
}

pub struct StageExecutor<C> {
    client: C,
    temperature: f32,
    deadline: Option<Duration>,
}

impl<C: InferenceClient> StageExecutor<C> {
    pub fn new(client: C, temperature: f32) -> Self {
        Self {
            client,
            temperature,
            deadline: None,
        }
    }

    /// Per-call deadline overriding the client's own timeout.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Run `stage` against `state`. Never writes anywhere.
    ///
    /// `default` is returned verbatim when the stage fails; it should be
    /// [`StageOutput::empty_for`] the same stage.
    pub async fn run_stage(
        &self,
        stage: StageId,
        conjetura: &str,
        state: &AnalysisState,
        default: StageOutput,
    ) -> Result<StageRun, RenderError> {
        let context = PromptContext::from_state(stage, state)?;
        let prompt = render(stage, conjetura, &context)?;

        let mut request =
            InferenceRequest::new(system_instruction(stage), prompt, self.temperature);
        if let Some(deadline) = self.deadline {
            request = request.with_deadline(deadline);
        }

        match self.attempt(stage, &request).await {
            Ok(output) => {
                tracing::info!(
                    stage = %stage,
                    model = self.client.model(),
                    entries = output.len(),
                    "Stage completed"
                );
                Ok(StageRun {
                    output,
                    failure: None,
                })
            }
            Err(error) => {
                tracing::warn!(
                    stage = %stage,
                    model = self.client.model(),
                    error = %error,
                    "Stage failed; using default"
                );
                Ok(StageRun {
                    output: default,
                    failure: Some(error),
                })
            }
        }
    }

    async fn attempt(
        &self,
        stage: StageId,
        request: &InferenceRequest,
    ) -> Result<StageOutput, StageError> {
        let raw = self.client.infer(request).await?;
        tracing::debug!(stage = %stage, chars = raw.chars().count(), "Model replied");
        let object = extract(&raw)?;
        Ok(parse_output(stage, &object)?)
    }
}
