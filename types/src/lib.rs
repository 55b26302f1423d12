//! Core domain types for Perito.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Panics are documented in assertions

mod analysis;
mod ids;
mod settings;
mod stage;

pub use analysis::{
    AnalysisState, AnalysisSummary, Definition, Motivation, Objective, PorQue, StageOutput,
    StageStatus, StateError,
};
pub use ids::ReportId;
pub use settings::{
    DEFAULT_BASE_URL, DEFAULT_MAX_RETRIES, DEFAULT_MODEL, DEFAULT_TEMPERATURE,
    DEFAULT_TIMEOUT_SECS, InferenceSettings, MAX_TEMPERATURE, SettingsError,
};
pub use stage::{MotivationCategory, StageId, UnknownCategoryError, UnknownStageError};

use std::ops::Deref;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Conjetura
// ============================================================================

/// Minimum length, in characters after trimming, of a usable problem statement.
pub const MIN_CONJETURA_CHARS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConjeturaError {
    #[error("la conjetura debe tener al menos {MIN_CONJETURA_CHARS} caracteres (tiene {0})")]
    TooShort(usize),
}

/// The free-text problem statement a report is built from.
///
/// Stored trimmed. Not sanitized: the text is embedded into prompts as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Conjetura(String);

impl Conjetura {
    pub fn new(value: impl Into<String>) -> Result<Self, ConjeturaError> {
        let value = value.into();
        let trimmed = value.trim();
        let chars = trimmed.chars().count();
        if chars < MIN_CONJETURA_CHARS {
            return Err(ConjeturaError::TooShort(chars));
        }
        Ok(Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl TryFrom<String> for Conjetura {
    type Error = ConjeturaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Conjetura {
    type Error = ConjeturaError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Conjetura> for String {
    fn from(value: Conjetura) -> Self {
        value.0
    }
}

impl Deref for Conjetura {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

impl AsRef<str> for Conjetura {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

// ============================================================================
// Method overview
// ============================================================================

/// One question of the Formal Causal Method and what answers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodPhase {
    pub pregunta: &'static str,
    pub descripcion: &'static str,
    pub stages: &'static [StageId],
}

/// The three phases of the method, in pipeline order.
pub const METHOD_PHASES: [MethodPhase; 3] = [
    MethodPhase {
        pregunta: "¿Por qué?",
        descripcion: "Motivaciones preceptivas, técnicas, facultativas y progresistas",
        stages: &[
            StageId::Preceptivas,
            StageId::Tecnicas,
            StageId::Facultativas,
            StageId::Progresistas,
        ],
    },
    MethodPhase {
        pregunta: "¿Para qué?",
        descripcion: "Objetivos relacionados con sus respectivos por qué",
        stages: &[StageId::Objetivos],
    },
    MethodPhase {
        pregunta: "¿Qué es?",
        descripcion: "Definición y contextualización del problema",
        stages: &[StageId::QueEs],
    },
];
