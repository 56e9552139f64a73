//! Structured result extraction
//!
//! Two stages: locate one candidate block in the agent text, then validate
//! it against the worker schema. Each stage has its own failure kind so the
//! outcome is deterministic.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::types::{FailureKind, ResultStatus, StructuredResult, TurnFailure};

/// Fenced code blocks: optional info string, then body up to the closing fence
///
/// Both fences must start a line, so a fence quoted inside a JSON string
/// (where newlines are escaped) never ends the block.
static FENCED_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?ms)^[ \t]*```([A-Za-z0-9_+-]*)[^\n]*\n(.*?)\n[ \t]*```[ \t]*\r?$")
        .expect("Invalid fenced block regex")
});

/// Why no structured result could be produced
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    /// No fenced block and no balanced brace region
    #[error("no structured output block found in agent output")]
    NoStructuredOutput,

    /// Candidate found but it is not a JSON object
    #[error("structured output block is not a JSON object: {0}")]
    MalformedOutput(String),

    /// JSON object that does not satisfy the worker schema
    #[error("structured output violates schema: {0}")]
    SchemaViolation(String),
}

impl ExtractionError {
    /// Failure kind recorded on the turn
    pub fn kind(&self) -> FailureKind {
        match self {
            ExtractionError::NoStructuredOutput => FailureKind::NoStructuredOutput,
            ExtractionError::MalformedOutput(_) => FailureKind::MalformedOutput,
            ExtractionError::SchemaViolation(_) => FailureKind::SchemaViolation,
        }
    }

    /// Convert to the failure marker stored on a turn
    pub fn to_failure(&self) -> TurnFailure {
        TurnFailure::new(self.kind(), self.to_string())
    }
}

/// Extract and validate the structured result from agent text
pub fn extract(text: &str) -> Result<StructuredResult, ExtractionError> {
    let candidate = find_candidate(text).ok_or(ExtractionError::NoStructuredOutput)?;

    let value: serde_json::Value = serde_json::from_str(candidate)
        .map_err(|e| ExtractionError::MalformedOutput(e.to_string()))?;
    if !value.is_object() {
        return Err(ExtractionError::MalformedOutput(format!(
            "expected an object, found {}",
            json_type_name(&value)
        )));
    }

    let result: StructuredResult = serde_json::from_value(value)
        .map_err(|e| ExtractionError::SchemaViolation(e.to_string()))?;
    validate(&result)?;
    Ok(result)
}

/// Enforce the rules serde cannot express
pub fn validate(result: &StructuredResult) -> Result<(), ExtractionError> {
    match result.status {
        ResultStatus::Completed if result.analysis.trim().is_empty() => Err(
            ExtractionError::SchemaViolation("status completed requires non-empty analysis".into()),
        ),
        ResultStatus::NeedsClarification
            if result.questions.iter().all(|q| q.trim().is_empty()) =>
        {
            Err(ExtractionError::SchemaViolation(
                "status needs_clarification requires non-empty questions".into(),
            ))
        }
        _ => Ok(()),
    }
}

/// Pick the single authoritative candidate block
///
/// Order: the whole text when it is itself one JSON object, else the last
/// JSON-looking fenced block, else the last top-level balanced brace region.
pub fn find_candidate(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if trimmed.starts_with('{')
        && serde_json::from_str::<serde_json::Value>(trimmed).is_ok_and(|v| v.is_object())
    {
        return Some(trimmed);
    }

    last_fenced_block(text).or_else(|| last_balanced_region(text))
}

/// Body of the last fenced block tagged `json` or whose body starts with `{`
pub fn last_fenced_block(text: &str) -> Option<&str> {
    FENCED_BLOCK
        .captures_iter(text)
        .filter_map(|caps| {
            let tag = caps.get(1).map_or("", |m| m.as_str());
            let body = caps.get(2)?.as_str().trim();
            let json_like = tag.eq_ignore_ascii_case("json") || body.starts_with('{');
            json_like.then_some(body)
        })
        .last()
}

/// Last `{...}` region at nesting depth zero
///
/// String literals are only tracked inside a region, so stray quotes in
/// surrounding prose do not hide a trailing object.
pub fn last_balanced_region(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut last: Option<(usize, usize)> = None;

    for (i, &b) in bytes.iter().enumerate() {
        if depth > 0 && in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' if depth > 0 => in_string = true,
            b'{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            b'}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    last = Some((start, i + 1));
                }
            }
            _ => {}
        }
    }

    last.map(|(s, e)| &text[s..e])
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
