//! Persisted session records
//!
//! A `SessionRecord` is one logical conversation with the agent. Its `id` and
//! `working_directory` never change after creation and its transcript only
//! grows; `status` always reflects the most recent turn.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::result::{
    InvocationMetadata, ResultStatus, SessionStatus, StructuredResult, TurnFailure,
    WorkerResponse,
};

/// One request/response exchange within a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Task (first turn) or follow-up message sent to the agent
    pub request: String,
    /// Agent text the extractor ran on
    pub raw_output: String,
    /// Captured stderr, kept for diagnosis
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stderr: String,
    /// Parsed result, if extraction succeeded
    pub result: Option<StructuredResult>,
    /// Failure marker, if the turn failed or produced no result
    pub failure: Option<TurnFailure>,
    /// Outcome recorded for this turn
    pub status: SessionStatus,
    /// Cost, timing and exit information
    pub metadata: InvocationMetadata,
    /// When the turn was recorded
    pub timestamp: DateTime<Utc>,
}

/// Durable record of one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Opaque unique identifier
    pub id: String,
    /// Task the session was started with
    pub task: String,
    /// Absolute directory the agent is scoped to
    pub working_directory: PathBuf,
    /// Model override the session was started with
    #[serde(default)]
    pub model: Option<String>,
    /// Token handed to the agent's own resume mechanism
    pub continuation_token: String,
    /// Append-only list of turns
    pub transcript: Vec<Turn>,
    /// Outcome of the most recent turn
    pub status: SessionStatus,
    /// Most recent parsed result, `None` if the last turn failed to parse
    pub last_result: Option<StructuredResult>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Refreshed on every turn
    pub updated_at: DateTime<Utc>,
}

/// Compact view of a record for `list`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub task: String,
    pub working_directory: PathBuf,
    pub model: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Number of turns recorded
    pub turns: usize,
    pub status: SessionStatus,
    /// Summary of the last parsed result, empty if none
    pub last_summary: String,
}

impl SessionRecord {
    /// Create a record from its first turn
    pub fn new(
        id: impl Into<String>,
        working_directory: PathBuf,
        model: Option<String>,
        first_turn: Turn,
    ) -> Self {
        let id = id.into();
        let now = first_turn.timestamp;
        let mut record = Self {
            continuation_token: id.clone(),
            id,
            task: first_turn.request.clone(),
            working_directory,
            model,
            transcript: Vec::new(),
            status: first_turn.status,
            last_result: None,
            created_at: now,
            updated_at: now,
        };
        record.append_turn(first_turn);
        record
    }

    /// Append a turn and refresh status, last result and timestamps
    pub fn append_turn(&mut self, turn: Turn) {
        self.status = turn.status;
        self.last_result.clone_from(&turn.result);
        if turn.timestamp > self.updated_at {
            self.updated_at = turn.timestamp;
        }
        self.transcript.push(turn);
    }

    /// Most recent turn
    pub fn last_turn(&self) -> Option<&Turn> {
        self.transcript.last()
    }

    /// Number of trailing turns that ended in `failed`
    pub fn consecutive_failures(&self) -> u32 {
        let count = self
            .transcript
            .iter()
            .rev()
            .take_while(|turn| turn.status.is_failed())
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    /// Build the list view of this record
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.id.clone(),
            task: self.task.clone(),
            working_directory: self.working_directory.clone(),
            model: self.model.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            turns: self.transcript.len(),
            status: self.status,
            last_summary: self
                .last_result
                .as_ref()
                .map(|r| r.summary.clone())
                .unwrap_or_default(),
        }
    }

    /// Build the caller response for the most recent turn
    pub fn latest_response(&self) -> Option<WorkerResponse> {
        let turn = self.last_turn()?;
        let result = turn.result.clone();
        let attach_raw = result.is_none() || turn.status.is_failed();
        let result = result.unwrap_or_else(|| StructuredResult {
            status: ResultStatus::Incomplete,
            summary: String::new(),
            analysis: String::new(),
            questions: Vec::new(),
            files_analyzed: Vec::new(),
        });

        Some(WorkerResponse {
            session_id: self.id.clone(),
            status: turn.status,
            summary: result.summary,
            analysis: result.analysis,
            questions: result.questions,
            files_analyzed: result.files_analyzed,
            cost: turn.metadata.cost_usd,
            turns_used: turn.metadata.turns_used,
            duration_ms: turn.metadata.duration_ms,
            model: turn.metadata.model.clone().or_else(|| self.model.clone()),
            exit_code: turn.metadata.exit_code,
            failure: turn.failure.clone(),
            raw_output: attach_raw.then(|| turn.raw_output.clone()),
        })
    }
}
