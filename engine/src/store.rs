//! In-memory report store.
//!
//! The map is guarded by a short synchronous critical section; each report
//! sits behind its own async mutex so a stage execution can hold it across
//! the inference call without blocking other reports.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use perito_types::{
    AnalysisState, Conjetura, Definition, Motivation, MotivationCategory, Objective, ReportId,
    StageId, StageOutput, StageStatus, StateError,
};

use crate::assembly::{AssembledReport, assemble};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("unknown report: {0}")]
    UnknownReport(ReportId),
    #[error("unknown category: {0}")]
    UnknownCategory(String),
    #[error("index {index} out of range for {category} (len {len})")]
    IndexOutOfRange {
        category: &'static str,
        index: usize,
        len: usize,
    },
    #[error("invalid {category} entry: {reason}")]
    InvalidEntry {
        category: &'static str,
        reason: String,
    },
    #[error("report {0} is finalized")]
    ReportFinalized(ReportId),
    #[error("report {0} already exists")]
    DuplicateReport(ReportId),
    #[error("stage {0} cannot store this kind of result")]
    OutputMismatch(StageId),
}

impl From<StateError> for StoreError {
    fn from(error: StateError) -> Self {
        match error {
            StateError::IndexOutOfRange {
                category,
                index,
                len,
            } => Self::IndexOutOfRange {
                category,
                index,
                len,
            },
            StateError::OutputMismatch { stage } => Self::OutputMismatch(stage),
        }
    }
}

/// One analysis: the problem statement and everything derived from it.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    id: ReportId,
    conjetura: Conjetura,
    pub(crate) state: AnalysisState,
    assembled: Option<AssembledReport>,
}

impl Report {
    #[must_use]
    pub fn new(id: ReportId, conjetura: Conjetura) -> Self {
        Self {
            id,
            conjetura,
            state: AnalysisState::new(),
            assembled: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> ReportId {
        self.id
    }

    #[must_use]
    pub fn conjetura(&self) -> &Conjetura {
        &self.conjetura
    }

    #[must_use]
    pub fn state(&self) -> &AnalysisState {
        &self.state
    }

    /// The final document, once [`ReportStore::finalize`] has run.
    #[must_use]
    pub fn assembled(&self) -> Option<&AssembledReport> {
        self.assembled.as_ref()
    }

    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.assembled.is_some()
    }

    pub(crate) fn ensure_open(&self) -> Result<(), StoreError> {
        if self.is_finalized() {
            return Err(StoreError::ReportFinalized(self.id));
        }
        Ok(())
    }
}

pub(crate) type ReportHandle = Arc<tokio::sync::Mutex<Report>>;

/// Editable slot named by a category string.
#[derive(Debug, Clone, Copy)]
enum EntryTarget {
    Motivations(MotivationCategory),
    Objectives,
}

impl EntryTarget {
    fn parse(raw: &str) -> Result<Self, StoreError> {
        if let Ok(stage) = StageId::parse(raw)
            && stage == StageId::Objetivos
        {
            return Ok(Self::Objectives);
        }
        MotivationCategory::parse(raw)
            .map(Self::Motivations)
            .map_err(|_| StoreError::UnknownCategory(raw.to_string()))
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Motivations(category) => category.as_str(),
            Self::Objectives => StageId::Objetivos.as_str(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ReportStore {
    reports: Mutex<HashMap<ReportId, ReportHandle>>,
}

impl ReportStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, HashMap<ReportId, ReportHandle>> {
        self.reports.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new report under a fresh id.
    pub fn create(&self, conjetura: Conjetura) -> ReportId {
        let mut map = self.map();
        let mut id = ReportId::new();
        while map.contains_key(&id) {
            id = ReportId::new();
        }
        map.insert(id, Arc::new(tokio::sync::Mutex::new(Report::new(id, conjetura))));
        tracing::info!(report_id = %id, "Report created");
        id
    }

    /// Register a new report under a caller-chosen id.
    pub fn create_with_id(&self, id: ReportId, conjetura: Conjetura) -> Result<(), StoreError> {
        let mut map = self.map();
        if map.contains_key(&id) {
            return Err(StoreError::DuplicateReport(id));
        }
        map.insert(id, Arc::new(tokio::sync::Mutex::new(Report::new(id, conjetura))));
        tracing::info!(report_id = %id, "Report created");
        Ok(())
    }

    pub(crate) fn handle(&self, id: ReportId) -> Result<ReportHandle, StoreError> {
        self.map()
            .get(&id)
            .cloned()
            .ok_or(StoreError::UnknownReport(id))
    }

    /// Snapshot of a report.
    pub async fn get(&self, id: ReportId) -> Result<Report, StoreError> {
        let handle = self.handle(id)?;
        let report = handle.lock().await;
        Ok(report.clone())
    }

    pub async fn state(&self, id: ReportId) -> Result<AnalysisState, StoreError> {
        let handle = self.handle(id)?;
        let report = handle.lock().await;
        Ok(report.state.clone())
    }

    /// Store a stage result, replacing the slot. Returns the new state version.
    pub async fn set_stage_result(
        &self,
        id: ReportId,
        stage: StageId,
        output: StageOutput,
        status: StageStatus,
    ) -> Result<u64, StoreError> {
        let handle = self.handle(id)?;
        let mut report = handle.lock().await;
        report.ensure_open()?;
        report.state.apply(stage, output, status)?;
        Ok(report.state.version())
    }

    /// Replace entry `index` of `category` with `value`.
    ///
    /// `category` is one of the four motivation categories or `objetivos`.
    /// On any error the state is left untouched.
    pub async fn edit_entry(
        &self,
        id: ReportId,
        category: &str,
        index: usize,
        value: Value,
    ) -> Result<u64, StoreError> {
        let target = EntryTarget::parse(category)?;
        let name = target.name();
        let invalid = |e: serde_json::Error| StoreError::InvalidEntry {
            category: name,
            reason: e.to_string(),
        };

        let handle = self.handle(id)?;
        let mut report = handle.lock().await;
        report.ensure_open()?;
        match target {
            EntryTarget::Motivations(cat) => {
                let motivation = Motivation::deserialize(&value).map_err(invalid)?;
                report.state.edit_motivation(cat, index, motivation)?;
            }
            EntryTarget::Objectives => {
                let objective = Objective::deserialize(&value).map_err(invalid)?;
                report.state.edit_objective(index, objective)?;
            }
        }
        tracing::info!(report_id = %id, category = name, index, "Entry edited");
        Ok(report.state.version())
    }

    pub async fn edit_motivation(
        &self,
        id: ReportId,
        category: MotivationCategory,
        index: usize,
        motivation: Motivation,
    ) -> Result<u64, StoreError> {
        let handle = self.handle(id)?;
        let mut report = handle.lock().await;
        report.ensure_open()?;
        report.state.edit_motivation(category, index, motivation)?;
        Ok(report.state.version())
    }

    pub async fn edit_objective(
        &self,
        id: ReportId,
        index: usize,
        objective: Objective,
    ) -> Result<u64, StoreError> {
        let handle = self.handle(id)?;
        let mut report = handle.lock().await;
        report.ensure_open()?;
        report.state.edit_objective(index, objective)?;
        Ok(report.state.version())
    }

    pub async fn set_definition(
        &self,
        id: ReportId,
        definition: Definition,
    ) -> Result<u64, StoreError> {
        let handle = self.handle(id)?;
        let mut report = handle.lock().await;
        report.ensure_open()?;
        report.state.set_definition(definition);
        Ok(report.state.version())
    }

    /// Assemble the final document and freeze the report.
    ///
    /// The state stays readable; further edits and stage runs fail with
    /// [`StoreError::ReportFinalized`].
    pub async fn finalize(&self, id: ReportId) -> Result<AssembledReport, StoreError> {
        let handle = self.handle(id)?;
        let mut report = handle.lock().await;
        report.ensure_open()?;
        let document = assemble(id, report.conjetura.as_str(), &report.state);
        tracing::info!(
            report_id = %id,
            expediente = %document.numero_expediente,
            state_version = document.state_version,
            "Report finalized"
        );
        report.assembled = Some(document.clone());
        Ok(document)
    }

    /// Drop a report. Returns whether it existed.
    pub fn remove(&self, id: ReportId) -> bool {
        self.map().remove(&id).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }

    #[must_use]
    pub fn ids(&self) -> Vec<ReportId> {
        self.map().keys().copied().collect()
    }
}
