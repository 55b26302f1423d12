//! Prompt templates and rendering.
//!
//! Each stage ships a Markdown template compiled into the binary. Templates
//! use `{name}` placeholders; literal braces are written `{{` and `}}`.
//! Available names are `conjetura` plus the identifier of every upstream
//! stage. Values are inserted verbatim and never re-scanned.

use std::collections::BTreeMap;

use thiserror::Error;

use perito_types::{AnalysisState, StageId, StageOutput};

const PRECEPTIVAS: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/assets/prompts/preceptivas.md"
));
const TECNICAS: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/assets/prompts/tecnicas.md"
));
const FACULTATIVAS: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/assets/prompts/facultativas.md"
));
const PROGRESISTAS: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/assets/prompts/progresistas.md"
));
const OBJETIVOS: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/assets/prompts/objetivos.md"
));
const QUE_ES: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/assets/prompts/que_es.md"
));

const CONJETURA_PLACEHOLDER: &str = "conjetura";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("placeholder {{{0}}} has no value")]
    MissingPlaceholder(String),
    #[error("malformed template at byte {offset}: {reason}")]
    Malformed { offset: usize, reason: &'static str },
}

/// A prompt could not be built. Always a configuration bug, never a model failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("cannot render {stage} prompt: {source}")]
    Template {
        stage: StageId,
        source: TemplateError,
    },
    #[error("cannot serialize {stage} result for the prompt: {reason}")]
    Context { stage: StageId, reason: String },
}

#[must_use]
pub const fn template(stage: StageId) -> &'static str {
    match stage {
        StageId::Preceptivas => PRECEPTIVAS,
        StageId::Tecnicas => TECNICAS,
        StageId::Facultativas => FACULTATIVAS,
        StageId::Progresistas => PROGRESISTAS,
        StageId::Objetivos => OBJETIVOS,
        StageId::QueEs => QUE_ES,
    }
}

#[must_use]
pub const fn system_instruction(stage: StageId) -> &'static str {
    match stage {
        StageId::Tecnicas => {
            "Eres un experto en análisis pericial y normativa técnica. \
             Responde siempre en el formato JSON solicitado."
        }
        StageId::Facultativas => {
            "Eres un perito experto que conoce la motivación profesional de su oficio. \
             Responde siempre en el formato JSON solicitado."
        }
        StageId::Progresistas => {
            "Eres un investigador pericial atento a lo que el caso aporta al conocimiento. \
             Responde siempre en el formato JSON solicitado."
        }
        StageId::Preceptivas | StageId::Objetivos | StageId::QueEs => {
            "Eres un experto en análisis pericial. \
             Responde siempre en el formato JSON solicitado."
        }
    }
}

/// Serialized results of prior stages, keyed by stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptContext {
    values: BTreeMap<StageId, String>,
}

impl PromptContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for `stage`: every upstream slot, and nothing else.
    pub fn from_state(stage: StageId, state: &AnalysisState) -> Result<Self, RenderError> {
        let mut context = Self::new();
        for upstream in stage.upstream() {
            let serialized = serialize_output(&state.output(*upstream)).map_err(|e| {
                RenderError::Context {
                    stage: *upstream,
                    reason: e.to_string(),
                }
            })?;
            context.insert(*upstream, serialized);
        }
        Ok(context)
    }

    pub fn insert(&mut self, stage: StageId, serialized: impl Into<String>) {
        self.values.insert(stage, serialized.into());
    }

    #[must_use]
    pub fn get(&self, stage: StageId) -> Option<&str> {
        self.values.get(&stage).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Two-space indented JSON with non-ASCII characters kept as-is.
pub fn serialize_output(output: &StageOutput) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(output)
}

pub fn render(
    stage: StageId,
    conjetura: &str,
    context: &PromptContext,
) -> Result<String, RenderError> {
    fill(template(stage), |name| {
        if name == CONJETURA_PLACEHOLDER {
            return Some(conjetura);
        }
        StageId::ALL
            .into_iter()
            .find(|s| s.as_str() == name)
            .and_then(|s| context.get(s))
    })
    .map_err(|source| RenderError::Template { stage, source })
}

/// Substitute placeholders in `template`.
pub fn fill<'v>(
    template: &str,
    value_of: impl Fn(&str) -> Option<&'v str>,
) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((offset, c)) = chars.next() {
        match c {
            '{' => {
                if chars.next_if(|&(_, next)| next == '{').is_some() {
                    out.push('{');
                    continue;
                }

                let mut end = None;
                for (i, next) in chars.by_ref() {
                    if next == '}' {
                        end = Some(i);
                        break;
                    }
                    if !(next.is_ascii_lowercase() || next.is_ascii_digit() || next == '_') {
                        return Err(TemplateError::Malformed {
                            offset,
                            reason: "invalid character in placeholder name",
                        });
                    }
                }
                let Some(end) = end else {
                    return Err(TemplateError::Malformed {
                        offset,
                        reason: "unclosed placeholder",
                    });
                };

                let name = &template[offset + 1..end];
                if name.is_empty() {
                    return Err(TemplateError::Malformed {
                        offset,
                        reason: "empty placeholder",
                    });
                }
                let value =
                    value_of(name).ok_or_else(|| TemplateError::MissingPlaceholder(name.into()))?;
                out.push_str(value);
            }
            '}' => {
                if chars.next_if(|&(_, next)| next == '}').is_none() {
                    return Err(TemplateError::Malformed {
                        offset,
                        reason: "unmatched closing brace",
                    });
                }
                out.push('}');
            }
            other => out.push(other),
        }
    }

    Ok(out)
}
