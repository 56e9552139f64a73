//! Protocol Extractor
//!
//! Turns the agent's raw stdout into a validated [`StructuredResult`] or a
//! typed [`ExtractionError`]. Stdout is first decoded as the agent's JSON
//! result envelope when possible; the envelope's `result` text (or the raw
//! stdout otherwise) is then scanned for the worker block.

mod envelope;
mod extractor;

pub use envelope::{AgentEnvelope, SUBTYPE_MAX_TURNS};
pub use extractor::{
    ExtractionError, extract, find_candidate, last_balanced_region, last_fenced_block, validate,
};

use crate::types::StructuredResult;

/// Agent stdout after envelope decoding and extraction
#[derive(Debug, Clone)]
pub struct ParsedOutput {
    /// Result envelope, when the agent printed one
    pub envelope: Option<AgentEnvelope>,
    /// Text the extractor ran on
    pub text: String,
    /// Extraction outcome
    pub result: Result<StructuredResult, ExtractionError>,
}

impl ParsedOutput {
    /// Whether the agent reported stopping at its turn limit
    pub fn hit_turn_limit(&self) -> bool {
        self.envelope.as_ref().is_some_and(AgentEnvelope::hit_turn_limit)
    }
}

/// Decode the envelope (if any) and extract the structured result
pub fn parse_agent_output(stdout: &str) -> ParsedOutput {
    let envelope = AgentEnvelope::decode(stdout);
    let text = match envelope {
        Some(ref env) => env.text().to_string(),
        None => stdout.to_string(),
    };
    let result = extract(&text);

    if let Err(ref e) = result {
        tracing::debug!(kind = %e.kind(), "Structured result extraction failed: {}", e);
    }

    ParsedOutput {
        envelope,
        text,
        result,
    }
}
