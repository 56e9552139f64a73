//! Classification of one agent run into a recorded turn
//!
//! Rules, in order:
//! - timeout: always `failed`/`timeout`; a valid partial result is kept
//! - valid structured result: its status wins, whatever the exit code
//! - turn limit without a result: `incomplete`, extraction failure attached
//! - non-zero exit with empty stdout: `failed`/`process_failed`
//! - anything else: `failed` with the extraction failure

use std::time::Duration;

use chrono::Utc;

use crate::invoker::InvocationOutput;
use crate::protocol::{ParsedOutput, parse_agent_output};
use crate::types::{FailureKind, InvocationMetadata, SessionStatus, Turn, TurnFailure};

/// Longest stderr excerpt copied into a failure message
const STDERR_EXCERPT: usize = 500;

/// A classified turn plus the continuation token the agent reported
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Turn to append to the transcript
    pub turn: Turn,
    /// Agent-side session id, when reported
    pub continuation_token: Option<String>,
}

/// Classify an agent run
pub fn classify(request: &str, output: &InvocationOutput, timeout: Option<Duration>) -> TurnOutcome {
    let parsed = parse_agent_output(&output.stdout);
    let metadata = metadata(&parsed, output);
    let continuation_token = parsed
        .envelope
        .as_ref()
        .and_then(|e| e.session_id.clone())
        .filter(|token| !token.trim().is_empty());

    let ParsedOutput { text, result, .. } = parsed;

    let (result, status, failure) = if output.timed_out {
        let budget = timeout.map_or_else(|| "its".to_string(), |t| format!("its {}s", t.as_secs()));
        let failure = TurnFailure::new(
            FailureKind::Timeout,
            format!("agent exceeded {budget} time budget and was killed"),
        );
        (result.ok(), SessionStatus::Failed, Some(failure))
    } else {
        match result {
            Ok(result) => {
                let status = SessionStatus::from(result.status);
                (Some(result), status, None)
            }
            Err(e) if metadata.hit_turn_limit => {
                (None, SessionStatus::Incomplete, Some(e.to_failure()))
            }
            Err(_) if output.exit_code != Some(0) && output.stdout.trim().is_empty() => {
                (None, SessionStatus::Failed, Some(process_failure(output)))
            }
            Err(e) => (None, SessionStatus::Failed, Some(e.to_failure())),
        }
    };

    if let Some(ref failure) = failure {
        tracing::warn!(kind = %failure.kind, status = %status, "Turn did not produce a usable result: {}", failure.message);
    }

    TurnOutcome {
        turn: Turn {
            request: request.to_string(),
            raw_output: text,
            stderr: output.stderr.clone(),
            result,
            failure,
            status,
            metadata,
            timestamp: Utc::now(),
        },
        continuation_token,
    }
}

fn metadata(parsed: &ParsedOutput, output: &InvocationOutput) -> InvocationMetadata {
    let measured_ms = u64::try_from(output.elapsed.as_millis()).unwrap_or(u64::MAX);
    let envelope = parsed.envelope.as_ref();
    InvocationMetadata {
        cost_usd: envelope.and_then(|e| e.total_cost_usd).unwrap_or(0.0),
        turns_used: envelope.and_then(|e| e.num_turns).unwrap_or(0),
        duration_ms: envelope.and_then(|e| e.duration_ms).unwrap_or(measured_ms),
        exit_code: output.exit_code,
        model: envelope.and_then(|e| e.model.clone()),
        hit_turn_limit: parsed.hit_turn_limit(),
        truncated: output.truncated,
    }
}

fn process_failure(output: &InvocationOutput) -> TurnFailure {
    let stderr = output.stderr.trim();
    let message = if stderr.is_empty() {
        match output.exit_code {
            Some(code) => format!("agent exited with code {code} and no output"),
            None => "agent was terminated by a signal with no output".to_string(),
        }
    } else {
        stderr.chars().take(STDERR_EXCERPT).collect()
    };
    TurnFailure::new(FailureKind::ProcessFailed, message)
}
