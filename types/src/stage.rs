//! Pipeline stages and motivation categories.
//!
//! The Formal Causal Method answers three questions in a fixed order:
//! *¿Por qué?* (four motivation categories), *¿Para qué?* (objectives), and
//! *¿Qué es?* (the definition). Each answer is one [`StageId`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown stage: {0}")]
pub struct UnknownStageError(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown category: {0}")]
pub struct UnknownCategoryError(pub String);

/// Lowercase, trim, and strip diacritics so `"Técnicas"` matches `"tecnicas"`.
fn fold_key(raw: &str) -> String {
    raw.trim()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
        .replace([' ', '-'], "_")
}

// ============================================================================
// Motivation categories
// ============================================================================

/// The four kinds of *¿Por qué?* motivations.
///
/// Order is significant: it is the order in which the pipeline produces them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MotivationCategory {
    Preceptivas,
    Tecnicas,
    Facultativas,
    Progresistas,
}

impl MotivationCategory {
    pub const ALL: [MotivationCategory; 4] = [
        MotivationCategory::Preceptivas,
        MotivationCategory::Tecnicas,
        MotivationCategory::Facultativas,
        MotivationCategory::Progresistas,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Preceptivas => "preceptivas",
            Self::Tecnicas => "tecnicas",
            Self::Facultativas => "facultativas",
            Self::Progresistas => "progresistas",
        }
    }

    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Preceptivas => "Preceptivas",
            Self::Tecnicas => "Técnicas",
            Self::Facultativas => "Facultativas",
            Self::Progresistas => "Progresistas",
        }
    }

    /// Short description shown in the method overview.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Preceptivas => "Surgen del propio enunciado del problema",
            Self::Tecnicas => "Implícitas en el problema (leyes, normas, reglamentos)",
            Self::Facultativas => "Motivan al autor a resolver el problema",
            Self::Progresistas => "Aportación al conocimiento actual",
        }
    }

    /// The stage that produces this category.
    #[must_use]
    pub const fn stage(self) -> StageId {
        match self {
            Self::Preceptivas => StageId::Preceptivas,
            Self::Tecnicas => StageId::Tecnicas,
            Self::Facultativas => StageId::Facultativas,
            Self::Progresistas => StageId::Progresistas,
        }
    }

    /// Parse a category name, tolerating case, accents and singular forms.
    pub fn parse(raw: &str) -> Result<Self, UnknownCategoryError> {
        match fold_key(raw).as_str() {
            "preceptivas" | "preceptiva" => Ok(Self::Preceptivas),
            "tecnicas" | "tecnica" => Ok(Self::Tecnicas),
            "facultativas" | "facultativa" => Ok(Self::Facultativas),
            "progresistas" | "progresista" => Ok(Self::Progresistas),
            _ => Err(UnknownCategoryError(raw.to_string())),
        }
    }
}

impl fmt::Display for MotivationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for MotivationCategory {
    type Error = UnknownCategoryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<MotivationCategory> for String {
    fn from(value: MotivationCategory) -> Self {
        value.as_str().to_string()
    }
}

// ============================================================================
// Stages
// ============================================================================

/// One step of the fixed six-stage pipeline.
///
/// The derived `Ord` follows dependency order: a stage may only read the
/// results of stages that compare less than it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    Preceptivas,
    Tecnicas,
    Facultativas,
    Progresistas,
    Objetivos,
    QueEs,
}

impl StageId {
    pub const ALL: [StageId; 6] = [
        StageId::Preceptivas,
        StageId::Tecnicas,
        StageId::Facultativas,
        StageId::Progresistas,
        StageId::Objetivos,
        StageId::QueEs,
    ];

    /// Identifier used for routing and as the prompt placeholder name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Preceptivas => "preceptivas",
            Self::Tecnicas => "tecnicas",
            Self::Facultativas => "facultativas",
            Self::Progresistas => "progresistas",
            Self::Objetivos => "objetivos",
            Self::QueEs => "que_es",
        }
    }

    /// Top-level key the model must emit for this stage.
    #[must_use]
    pub const fn result_key(self) -> &'static str {
        match self {
            Self::Objetivos => "para_que",
            other => other.as_str(),
        }
    }

    #[must_use]
    pub const fn position(self) -> usize {
        self as usize
    }

    /// Stages whose results this stage is conditioned on, in order.
    #[must_use]
    pub fn upstream(self) -> &'static [StageId] {
        const ORDER: &[StageId] = &StageId::ALL;
        &ORDER[..self.position()]
    }

    #[must_use]
    pub fn next(self) -> Option<StageId> {
        Self::ALL.get(self.position() + 1).copied()
    }

    /// The motivation category this stage produces, if any.
    #[must_use]
    pub const fn category(self) -> Option<MotivationCategory> {
        match self {
            Self::Preceptivas => Some(MotivationCategory::Preceptivas),
            Self::Tecnicas => Some(MotivationCategory::Tecnicas),
            Self::Facultativas => Some(MotivationCategory::Facultativas),
            Self::Progresistas => Some(MotivationCategory::Progresistas),
            Self::Objetivos | Self::QueEs => None,
        }
    }

    pub fn parse(raw: &str) -> Result<Self, UnknownStageError> {
        match fold_key(raw).as_str() {
            "objetivos" | "para_que" => Ok(Self::Objetivos),
            "que_es" => Ok(Self::QueEs),
            other => MotivationCategory::parse(other)
                .map(MotivationCategory::stage)
                .map_err(|_| UnknownStageError(raw.to_string())),
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageId {
    type Err = UnknownStageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
