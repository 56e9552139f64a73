//! Agent result envelope
//!
//! With `--output-format json` the agent prints a single result object.
//! The worker's structured block lives inside its `result` string.

use serde::{Deserialize, Serialize};

/// Subtype the agent reports when it stopped at its turn limit
pub const SUBTYPE_MAX_TURNS: &str = "error_max_turns";

/// Result object printed by the agent CLI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentEnvelope {
    /// Message type, `"result"` for the final envelope
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Result subtype (`success`, `error_max_turns`, ...)
    #[serde(default)]
    pub subtype: String,
    /// Whether the agent flagged the run as an error
    #[serde(default)]
    pub is_error: bool,
    /// Final agent text
    #[serde(default)]
    pub result: Option<String>,
    /// Agent-side session id, used as the continuation token
    #[serde(default)]
    pub session_id: Option<String>,
    /// Total cost in USD
    #[serde(default)]
    pub total_cost_usd: Option<f64>,
    /// Agentic turns used
    #[serde(default)]
    pub num_turns: Option<u32>,
    /// Agent-measured duration
    #[serde(default)]
    pub duration_ms: Option<u64>,
    /// Model that served the run
    #[serde(default)]
    pub model: Option<String>,
}

impl AgentEnvelope {
    /// Decode an envelope from the agent's stdout
    ///
    /// Tries the whole output first, then its last non-empty line (for agents
    /// that print log lines before the envelope). Returns `None` when neither
    /// is a result envelope.
    pub fn decode(stdout: &str) -> Option<Self> {
        let trimmed = stdout.trim();
        if trimmed.is_empty() {
            return None;
        }

        if let Some(envelope) = Self::decode_one(trimmed) {
            return Some(envelope);
        }

        let last_line = trimmed.lines().rev().find(|l| !l.trim().is_empty())?;
        Self::decode_one(last_line.trim())
    }

    fn decode_one(candidate: &str) -> Option<Self> {
        if !candidate.starts_with('{') {
            return None;
        }
        let value: serde_json::Value = serde_json::from_str(candidate).ok()?;
        let object = value.as_object()?;

        // A bare worker block also parses as an object; only accept the
        // agent's own result envelope here.
        let is_envelope = object.get("type").and_then(|t| t.as_str()) == Some("result")
            || (object.contains_key("result") && object.contains_key("session_id"));
        if !is_envelope {
            return None;
        }

        match serde_json::from_value(value) {
            Ok(envelope) => Some(envelope),
            Err(e) => {
                tracing::debug!("Result envelope did not match expected shape: {}", e);
                None
            }
        }
    }

    /// Whether the agent stopped because it ran out of turns
    pub fn hit_turn_limit(&self) -> bool {
        self.subtype == SUBTYPE_MAX_TURNS
    }

    /// Agent text carried by the envelope
    pub fn text(&self) -> &str {
        self.result.as_deref().unwrap_or("")
    }
}
