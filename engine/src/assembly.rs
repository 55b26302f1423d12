//! Final document assembly.
//!
//! Turns a report into the document handed to the expert: expediente number,
//! date of elaboration, the conjetura, and the findings grouped by question.

use chrono::{DateTime, Datelike, Local, TimeZone};
use serde::{Deserialize, Serialize};

use perito_types::{AnalysisState, AnalysisSummary, ReportId, StageId};

const MESES: [&str; 12] = [
    "enero",
    "febrero",
    "marzo",
    "abril",
    "mayo",
    "junio",
    "julio",
    "agosto",
    "septiembre",
    "octubre",
    "noviembre",
    "diciembre",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssembledReport {
    /// `EXP-YYYYMMDD-XXXXXX`.
    pub numero_expediente: String,
    /// Long Spanish date, e.g. `15 de octubre de 2026`.
    pub fecha_elaboracion: String,
    pub conjetura: String,
    pub analisis: AnalysisSummary,
    /// Stages whose slot holds a fallback rather than a model result.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<StageId>,
    /// `AnalysisState::version` this document was built from.
    pub state_version: u64,
}

/// Six upper-case hex digits taken from the report id.
#[must_use]
pub fn expediente_number<Tz: TimeZone>(id: ReportId, at: &DateTime<Tz>) -> String {
    let hex = id.value().simple().to_string().to_uppercase();
    format!(
        "EXP-{:04}{:02}{:02}-{}",
        at.year(),
        at.month(),
        at.day(),
        &hex[..6]
    )
}

#[must_use]
pub fn spanish_long_date<Tz: TimeZone>(at: &DateTime<Tz>) -> String {
    let month = MESES[at.month0() as usize];
    format!("{:02} de {month} de {}", at.day(), at.year())
}

/// Assemble using the local clock.
#[must_use]
pub fn assemble(id: ReportId, conjetura: &str, state: &AnalysisState) -> AssembledReport {
    assemble_at(id, conjetura, state, &Local::now())
}

#[must_use]
pub fn assemble_at<Tz: TimeZone>(
    id: ReportId,
    conjetura: &str,
    state: &AnalysisState,
    at: &DateTime<Tz>,
) -> AssembledReport {
    AssembledReport {
        numero_expediente: expediente_number(id, at),
        fecha_elaboracion: spanish_long_date(at),
        conjetura: conjetura.to_string(),
        analisis: state.summary(),
        degraded: state.degraded_stages(),
        state_version: state.version(),
    }
}
