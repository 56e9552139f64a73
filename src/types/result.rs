//! Structured results and turn outcomes
//!
//! `StructuredResult` is the validated object extracted from the agent's final
//! output. `SessionStatus` is the per-turn outcome the Session Manager
//! records; it is a superset of the agent's own `ResultStatus`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Status reported by the agent inside its structured block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    /// Analysis finished
    Completed,
    /// Agent needs answers from the caller
    NeedsClarification,
    /// Agent ran out of budget before finishing
    Incomplete,
}

/// Outcome of the most recent turn of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Analysis finished; the caller may still continue
    Completed,
    /// Caller expected to answer the agent's questions via continue
    NeedsClarification,
    /// Turn budget exhausted; continue to extend
    Incomplete,
    /// Protocol extraction failed or the process errored
    Failed,
}

impl SessionStatus {
    /// Snake-case name, as serialized
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Completed => "completed",
            SessionStatus::NeedsClarification => "needs_clarification",
            SessionStatus::Incomplete => "incomplete",
            SessionStatus::Failed => "failed",
        }
    }

    /// Whether this turn produced a usable result
    pub fn is_failed(self) -> bool {
        self == SessionStatus::Failed
    }
}

impl From<ResultStatus> for SessionStatus {
    fn from(status: ResultStatus) -> Self {
        match status {
            ResultStatus::Completed => SessionStatus::Completed,
            ResultStatus::NeedsClarification => SessionStatus::NeedsClarification,
            ResultStatus::Incomplete => SessionStatus::Incomplete,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Schema-validated result block emitted by the agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredResult {
    /// Agent-reported status
    pub status: ResultStatus,
    /// One-line summary
    #[serde(default)]
    pub summary: String,
    /// Full analysis text (non-empty when completed)
    #[serde(default)]
    pub analysis: String,
    /// Open questions (non-empty when clarification is needed)
    #[serde(default)]
    pub questions: Vec<String>,
    /// Files the agent looked at
    #[serde(default)]
    pub files_analyzed: Vec<String>,
}

/// Why a turn did not yield a usable structured result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Process exceeded its time budget and was killed
    Timeout,
    /// No fenced block or balanced brace region in the output
    NoStructuredOutput,
    /// Candidate found but not a JSON object
    MalformedOutput,
    /// JSON object missing or mistyping required fields
    SchemaViolation,
    /// Process exited non-zero without producing output
    ProcessFailed,
}

impl FailureKind {
    /// Snake-case name, as serialized
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::NoStructuredOutput => "no_structured_output",
            FailureKind::MalformedOutput => "malformed_output",
            FailureKind::SchemaViolation => "schema_violation",
            FailureKind::ProcessFailed => "process_failed",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure marker attached to a turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnFailure {
    /// Failure classification
    pub kind: FailureKind,
    /// Human-readable detail
    pub message: String,
}

impl TurnFailure {
    /// Create a new failure marker
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Metadata about one agent invocation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvocationMetadata {
    /// Total cost in USD, when the agent reports it
    #[serde(default)]
    pub cost_usd: f64,
    /// Agentic turns the agent used
    #[serde(default)]
    pub turns_used: u32,
    /// Wall time (agent-reported when available)
    #[serde(default)]
    pub duration_ms: u64,
    /// Process exit code; `None` when killed by a signal
    #[serde(default)]
    pub exit_code: Option<i32>,
    /// Model the agent reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Whether the agent stopped because it hit its turn limit
    #[serde(default)]
    pub hit_turn_limit: bool,
    /// Whether captured output was cut at the buffer cap
    #[serde(default)]
    pub truncated: bool,
}

/// JSON object returned to the caller for exec and continue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResponse {
    /// Session the turn belongs to
    pub session_id: String,
    /// Outcome of this turn
    pub status: SessionStatus,
    /// Summary from the structured result
    pub summary: String,
    /// Analysis from the structured result
    pub analysis: String,
    /// Questions from the structured result
    pub questions: Vec<String>,
    /// Files the agent looked at
    pub files_analyzed: Vec<String>,
    /// Cost in USD
    pub cost: f64,
    /// Agentic turns used
    pub turns_used: u32,
    /// Duration in milliseconds
    pub duration_ms: u64,
    /// Model reported by the agent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Process exit code
    pub exit_code: Option<i32>,
    /// Failure marker, if the turn failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<TurnFailure>,
    /// Raw agent output, attached only when the turn did not yield a result
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
}
