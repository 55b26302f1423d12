//! Structured data from untrustworthy model text.
//!
//! Models wrap JSON in prose, fences, or both. [`extract`] tries a fixed
//! chain of strategies and takes the first that yields a JSON object.
//! Arrays and scalars never count.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

/// A JSON object, the only shape a stage result can take.
pub type JsonObject = Map<String, Value>;

static JSON_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)```json[ \t]*\r?\n?(.*?)```").expect("valid fenced JSON regex")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no JSON object found in model response ({chars} chars)")]
pub struct ExtractionFailed {
    pub chars: usize,
}

/// Run the strategies in order: direct parse, `json` fence, brace span.
pub fn extract(raw: &str) -> Result<JsonObject, ExtractionFailed> {
    parse_direct(raw)
        .or_else(|| parse_fenced(raw))
        .or_else(|| parse_braced(raw))
        .ok_or(ExtractionFailed {
            chars: raw.chars().count(),
        })
}

fn as_object(text: &str) -> Option<JsonObject> {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

#[must_use]
pub fn parse_direct(raw: &str) -> Option<JsonObject> {
    as_object(raw)
}

/// First fenced block labelled `json` whose body is an object.
#[must_use]
pub fn parse_fenced(raw: &str) -> Option<JsonObject> {
    JSON_FENCE
        .captures_iter(raw)
        .filter_map(|caps| caps.get(1))
        .find_map(|body| as_object(body.as_str()))
}

/// Greedy span from the first `{` to the last `}`, then each balanced
/// top-level `{...}` in order.
#[must_use]
pub fn parse_braced(raw: &str) -> Option<JsonObject> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if start < end
        && let Some(object) = as_object(&raw[start..=end])
    {
        return Some(object);
    }

    balanced_spans(raw).into_iter().find_map(as_object)
}

/// Top-level `{...}` spans, skipping braces inside JSON string literals.
///
/// An opener that never closes is dropped and the scan resumes right after
/// it, so stray prose braces cannot hide a later object.
fn balanced_spans(raw: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut from = 0;
    while let Some(unclosed) = scan_spans(raw, from, &mut spans) {
        from = unclosed + 1;
    }
    spans
}

/// Collect closed spans starting at byte `from`. Returns the offset of the
/// outermost opener left open at the end of input, if any.
fn scan_spans<'a>(raw: &'a str, from: usize, spans: &mut Vec<&'a str>) -> Option<usize> {
    let mut depth = 0usize;
    let mut open = from;
    let mut in_string = false;
    let mut escaped = false;

    for (i, b) in raw.bytes().enumerate().skip(from) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match b {
            b'"' if depth > 0 => in_string = true,
            b'{' => {
                if depth == 0 {
                    open = i;
                }
                depth += 1;
            }
            b'}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    spans.push(&raw[open..=i]);
                }
            }
            _ => {}
        }
    }

    (depth > 0).then_some(open)
}
