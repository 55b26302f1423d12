//! Structured findings and the accumulated analysis state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::stage::{MotivationCategory, StageId};

/// A titled justification belonging to one motivation category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Motivation {
    pub titulo: String,
    pub contenido: String,
}

impl Motivation {
    pub fn new(titulo: impl Into<String>, contenido: impl Into<String>) -> Self {
        Self {
            titulo: titulo.into(),
            contenido: contenido.into(),
        }
    }
}

/// A purpose statement (*¿Para qué?*) tied to one motivation category.
///
/// `tipo` is expected to name a category that already has entries, but that
/// link is only suggested to the model, never enforced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Objective {
    pub titulo: String,
    pub tipo: MotivationCategory,
    pub contenido: String,
}

/// The problem definition (*¿Qué es?*).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definition {
    pub contenido: String,
    pub contexto: String,
}

impl Definition {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contenido.trim().is_empty() && self.contexto.trim().is_empty()
    }
}

/// The structured result of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StageOutput {
    Motivations(Vec<Motivation>),
    Objectives(Vec<Objective>),
    Definition(Definition),
}

impl StageOutput {
    /// The empty result used when a stage degrades.
    #[must_use]
    pub fn empty_for(stage: StageId) -> Self {
        match stage {
            StageId::Objetivos => Self::Objectives(Vec::new()),
            StageId::QueEs => Self::Definition(Definition::default()),
            _ => Self::Motivations(Vec::new()),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Motivations(items) => items.is_empty(),
            Self::Objectives(items) => items.is_empty(),
            Self::Definition(def) => def.is_empty(),
        }
    }

    /// Number of entries; a definition counts as one unless empty.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Motivations(items) => items.len(),
            Self::Objectives(items) => items.len(),
            Self::Definition(def) => usize::from(!def.is_empty()),
        }
    }

    /// Whether this output has the right variant for `stage`.
    #[must_use]
    pub fn fits(&self, stage: StageId) -> bool {
        matches!(
            (stage, self),
            (StageId::Objetivos, Self::Objectives(_))
                | (StageId::QueEs, Self::Definition(_))
                | (
                    StageId::Preceptivas
                        | StageId::Tecnicas
                        | StageId::Facultativas
                        | StageId::Progresistas,
                    Self::Motivations(_)
                )
        )
    }
}

/// How a stage's slot came to be filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// The model produced a well-formed result.
    Completed,
    /// The stage failed and its slot holds the default.
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("index {index} out of range for {category} (len {len})")]
    IndexOutOfRange {
        category: &'static str,
        index: usize,
        len: usize,
    },
    #[error("stage {stage} cannot store this kind of result")]
    OutputMismatch { stage: StageId },
}

/// Everything the pipeline has produced so far for one report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisState {
    pub preceptivas: Vec<Motivation>,
    pub tecnicas: Vec<Motivation>,
    pub facultativas: Vec<Motivation>,
    pub progresistas: Vec<Motivation>,
    pub objetivos: Vec<Objective>,
    pub que_es: Option<Definition>,
    #[serde(default)]
    stages: BTreeMap<StageId, StageStatus>,
    #[serde(default)]
    version: u64,
}

impl AnalysisState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Incremented on every mutation.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn motivations(&self, category: MotivationCategory) -> &[Motivation] {
        match category {
            MotivationCategory::Preceptivas => &self.preceptivas,
            MotivationCategory::Tecnicas => &self.tecnicas,
            MotivationCategory::Facultativas => &self.facultativas,
            MotivationCategory::Progresistas => &self.progresistas,
        }
    }

    fn motivations_mut(&mut self, category: MotivationCategory) -> &mut Vec<Motivation> {
        match category {
            MotivationCategory::Preceptivas => &mut self.preceptivas,
            MotivationCategory::Tecnicas => &mut self.tecnicas,
            MotivationCategory::Facultativas => &mut self.facultativas,
            MotivationCategory::Progresistas => &mut self.progresistas,
        }
    }

    /// Status recorded for `stage`, or `None` if it has never run.
    #[must_use]
    pub fn status(&self, stage: StageId) -> Option<StageStatus> {
        self.stages.get(&stage).copied()
    }

    /// Whether the stage's slot holds non-empty content.
    #[must_use]
    pub fn is_populated(&self, stage: StageId) -> bool {
        match stage.category() {
            Some(category) => !self.motivations(category).is_empty(),
            None if stage == StageId::Objetivos => !self.objetivos.is_empty(),
            None => self.que_es.as_ref().is_some_and(|def| !def.is_empty()),
        }
    }

    /// Upstream stages that have not run yet.
    #[must_use]
    pub fn missing_upstream(&self, stage: StageId) -> Vec<StageId> {
        stage
            .upstream()
            .iter()
            .copied()
            .filter(|s| self.status(*s).is_none() && !self.is_populated(*s))
            .collect()
    }

    /// A stage may run once every upstream stage has run, even if some of
    /// them degraded to empty.
    #[must_use]
    pub fn can_run(&self, stage: StageId) -> bool {
        self.missing_upstream(stage).is_empty()
    }

    /// Stages that ran but fell back to their default.
    #[must_use]
    pub fn degraded_stages(&self) -> Vec<StageId> {
        self.stages
            .iter()
            .filter(|(_, status)| **status == StageStatus::Degraded)
            .map(|(stage, _)| *stage)
            .collect()
    }

    /// Snapshot of the slot for `stage`.
    #[must_use]
    pub fn output(&self, stage: StageId) -> StageOutput {
        match stage.category() {
            Some(category) => StageOutput::Motivations(self.motivations(category).to_vec()),
            None if stage == StageId::Objetivos => StageOutput::Objectives(self.objetivos.clone()),
            None => StageOutput::Definition(self.que_es.clone().unwrap_or_default()),
        }
    }

    /// Store a stage result, replacing whatever the slot held.
    pub fn apply(
        &mut self,
        stage: StageId,
        output: StageOutput,
        status: StageStatus,
    ) -> Result<(), StateError> {
        match (stage.category(), output) {
            (Some(category), StageOutput::Motivations(items)) => {
                *self.motivations_mut(category) = items;
            }
            (None, StageOutput::Objectives(items)) if stage == StageId::Objetivos => {
                self.objetivos = items;
            }
            (None, StageOutput::Definition(def)) if stage == StageId::QueEs => {
                self.que_es = Some(def);
            }
            _ => return Err(StateError::OutputMismatch { stage }),
        }
        self.stages.insert(stage, status);
        self.version += 1;
        Ok(())
    }

    /// Replace one motivation in place.
    pub fn edit_motivation(
        &mut self,
        category: MotivationCategory,
        index: usize,
        motivation: Motivation,
    ) -> Result<(), StateError> {
        let items = self.motivations_mut(category);
        let len = items.len();
        let slot = items.get_mut(index).ok_or(StateError::IndexOutOfRange {
            category: category.as_str(),
            index,
            len,
        })?;
        *slot = motivation;
        self.version += 1;
        Ok(())
    }

    /// Replace one objective in place.
    pub fn edit_objective(&mut self, index: usize, objective: Objective) -> Result<(), StateError> {
        let len = self.objetivos.len();
        let slot = self
            .objetivos
            .get_mut(index)
            .ok_or(StateError::IndexOutOfRange {
                category: StageId::Objetivos.as_str(),
                index,
                len,
            })?;
        *slot = objective;
        self.version += 1;
        Ok(())
    }

    pub fn set_definition(&mut self, definition: Definition) {
        self.que_es = Some(definition);
        self.version += 1;
    }

    /// Group the findings by the three questions of the method.
    #[must_use]
    pub fn summary(&self) -> AnalysisSummary {
        AnalysisSummary {
            por_que: PorQue {
                preceptivas: self.preceptivas.clone(),
                tecnicas: self.tecnicas.clone(),
                facultativas: self.facultativas.clone(),
                progresistas: self.progresistas.clone(),
            },
            para_que: self.objetivos.clone(),
            que_es: self.que_es.clone().unwrap_or_default(),
        }
    }
}

/// The four motivation categories, grouped under *¿Por qué?*.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PorQue {
    pub preceptivas: Vec<Motivation>,
    pub tecnicas: Vec<Motivation>,
    pub facultativas: Vec<Motivation>,
    pub progresistas: Vec<Motivation>,
}

/// Findings grouped by question: why, what for, and what.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub por_que: PorQue,
    pub para_que: Vec<Objective>,
    pub que_es: Definition,
}
