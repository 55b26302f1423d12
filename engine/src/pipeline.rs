//! Stage sequencing.
//!
//! Two ways to drive the six stages:
//!
//! - **Eager**: [`Pipeline::run_all`] runs every stage in order against a
//!   fresh state and hands back the result. Nothing touches the store.
//! - **On demand**: [`Pipeline::run_stage`] runs one stage of a stored report.
//!   A populated slot is served from cache. Otherwise the report's lock is
//!   held for the whole execution and the result is written back before the
//!   lock is released.
//!
//! Write-back happens only after a stage finishes, so dropping or aborting a
//! pipeline future never leaves a partial result behind.

use std::sync::Arc;

use futures_util::future::{AbortHandle, AbortRegistration, Abortable};
use thiserror::Error;

use perito_providers::InferenceClient;
use perito_types::{AnalysisState, AnalysisSummary, Conjetura, ReportId, StageId, StageOutput};

use crate::executor::{StageError, StageExecutor};
use crate::prompt::RenderError;
use crate::store::{Report, ReportStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("stage {stage} needs {} to run first", join_stages(.missing))]
    DependencyUnsatisfied {
        stage: StageId,
        missing: Vec<StageId>,
    },
    #[error("stage {stage} was cancelled")]
    Cancelled { stage: StageId },
}

fn join_stages(stages: &[StageId]) -> String {
    stages
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result of a full eager run.
#[derive(Debug, Clone, PartialEq)]
pub struct EagerRun {
    pub state: AnalysisState,
    /// Stages that fell back to their empty default, in pipeline order.
    pub degraded: Vec<StageId>,
    pub failures: Vec<(StageId, StageError)>,
}

impl EagerRun {
    /// The analysis grouped as `por_que` / `para_que` / `que_es`.
    #[must_use]
    pub fn summary(&self) -> AnalysisSummary {
        self.state.summary()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.degraded.is_empty()
    }
}

/// Result of an on-demand stage request.
#[derive(Debug, Clone, PartialEq)]
pub struct StageFetch {
    pub stage: StageId,
    pub output: StageOutput,
    /// Served from the store without calling the model.
    pub cached: bool,
    /// False when `output` is a fallback.
    pub succeeded: bool,
    pub failure: Option<StageError>,
    /// State version after this request.
    pub version: u64,
}

pub struct Pipeline<C> {
    executor: StageExecutor<C>,
    store: Arc<ReportStore>,
    require_upstream: bool,
}

impl<C: InferenceClient> Pipeline<C> {
    pub fn new(executor: StageExecutor<C>, store: Arc<ReportStore>) -> Self {
        Self {
            executor,
            store,
            require_upstream: true,
        }
    }

    /// When false, on-demand stages run even if upstream stages never ran;
    /// their placeholders are filled with empty results.
    #[must_use]
    pub fn with_require_upstream(mut self, require: bool) -> Self {
        self.require_upstream = require;
        self
    }

    pub fn store(&self) -> &Arc<ReportStore> {
        &self.store
    }

    pub fn executor(&self) -> &StageExecutor<C> {
        &self.executor
    }

    /// Run all six stages in order against a fresh state.
    ///
    /// Failed stages degrade to empty and the run continues; only a render
    /// error aborts it.
    pub async fn run_all(&self, conjetura: &Conjetura) -> Result<EagerRun, PipelineError> {
        let mut state = AnalysisState::new();
        let mut failures = Vec::new();

        for stage in StageId::ALL {
            let run = self
                .executor
                .run_stage(stage, conjetura, &state, StageOutput::empty_for(stage))
                .await?;
            let status = run.status();
            if let Some(failure) = run.failure {
                failures.push((stage, failure));
            }
            state
                .apply(stage, run.output, status)
                .map_err(StoreError::from)?;
        }

        let degraded = state.degraded_stages();
        if degraded.is_empty() {
            tracing::info!("Eager analysis completed");
        } else {
            tracing::warn!(
                degraded = %join_stages(&degraded),
                "Eager analysis completed with degraded stages"
            );
        }

        Ok(EagerRun {
            state,
            degraded,
            failures,
        })
    }

    /// Run one stage of a stored report, or serve it from cache.
    pub async fn run_stage(
        &self,
        id: ReportId,
        stage: StageId,
    ) -> Result<StageFetch, PipelineError> {
        let handle = self.store.handle(id)?;
        let mut report = handle.lock().await;
        self.fetch(&mut report, stage).await
    }

    /// Run `target`, first running any upstream stage that never ran.
    ///
    /// Holds the report for the whole sequence.
    pub async fn run_through(
        &self,
        id: ReportId,
        target: StageId,
    ) -> Result<StageFetch, PipelineError> {
        let handle = self.store.handle(id)?;
        let mut report = handle.lock().await;
        report.ensure_open()?;

        let missing = report.state.missing_upstream(target);
        if !missing.is_empty() {
            tracing::info!(
                report_id = %id,
                stage = %target,
                triggered = %join_stages(&missing),
                "Running missing upstream stages"
            );
        }
        for stage in missing {
            self.execute(&mut report, stage).await?;
        }
        self.fetch(&mut report, target).await
    }

    /// [`Self::run_stage`] that stops when `registration`'s handle is aborted.
    pub async fn run_stage_abortable(
        &self,
        id: ReportId,
        stage: StageId,
        registration: AbortRegistration,
    ) -> Result<StageFetch, PipelineError> {
        Abortable::new(self.run_stage(id, stage), registration)
            .await
            .map_err(|_| {
                tracing::info!(report_id = %id, stage = %stage, "Stage cancelled");
                PipelineError::Cancelled { stage }
            })?
    }

    async fn fetch(
        &self,
        report: &mut Report,
        stage: StageId,
    ) -> Result<StageFetch, PipelineError> {
        report.ensure_open()?;

        if report.state.is_populated(stage) {
            tracing::debug!(report_id = %report.id(), stage = %stage, "Stage served from cache");
            return Ok(StageFetch {
                stage,
                output: report.state.output(stage),
                cached: true,
                succeeded: true,
                failure: None,
                version: report.state.version(),
            });
        }

        if self.require_upstream {
            let missing = report.state.missing_upstream(stage);
            if !missing.is_empty() {
                return Err(PipelineError::DependencyUnsatisfied { stage, missing });
            }
        }

        self.execute(report, stage).await
    }

    async fn execute(
        &self,
        report: &mut Report,
        stage: StageId,
    ) -> Result<StageFetch, PipelineError> {
        let run = self
            .executor
            .run_stage(
                stage,
                report.conjetura(),
                &report.state,
                StageOutput::empty_for(stage),
            )
            .await?;

        let status = run.status();
        report
            .state
            .apply(stage, run.output.clone(), status)
            .map_err(StoreError::from)?;
        tracing::info!(
            report_id = %report.id(),
            stage = %stage,
            status = ?status,
            version = report.state.version(),
            "Stage stored"
        );

        Ok(StageFetch {
            stage,
            succeeded: run.succeeded(),
            output: run.output,
            cached: false,
            failure: run.failure,
            version: report.state.version(),
        })
    }
}

/// Wrap any pipeline future so it can be cancelled from elsewhere.
///
/// Resolves to `None` when aborted.
pub fn cancellable<F: Future>(
    future: F,
) -> (impl Future<Output = Option<F::Output>>, AbortHandle) {
    let (handle, registration) = AbortHandle::new_pair();
    let future = Abortable::new(future, registration);
    (async move { future.await.ok() }, handle)
}
