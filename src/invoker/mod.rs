//! Process Invoker
//!
//! Runs the external agent once per turn with a read-only capability set,
//! a turn budget and a wall-clock budget, and returns everything it printed
//! together with its exit status. Interpretation of the output is left to
//! the caller.

mod capabilities;
mod command;
mod process;
mod wrapped_child;

use std::fmt::Debug;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use crate::types::Result;

pub use capabilities::{
    CapabilitySet, DEFAULT_ALLOWED_TOOLS, DISALLOWED_TOOLS, is_write_capability,
};
pub use command::{CommandBuilder, DANGEROUS_ENV_VARS, NESTED_SESSION_ENV, find_agent_bin};
pub use process::{CliInvoker, DEFAULT_OUTPUT_LIMIT};
pub use wrapped_child::WrappedChild;

/// Whether a turn starts a new agent session or resumes one
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationMode {
    /// First turn: the agent session is created with our id
    Start {
        /// Id shared by the record and the agent session
        session_id: String,
        /// Appended to the agent's system prompt
        system_prompt: String,
    },
    /// Later turn: resume the agent's own session
    Resume {
        /// Token handed to `--resume`
        continuation_token: String,
    },
}

/// Everything needed to run the agent once
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    /// Task or follow-up message
    pub prompt: String,
    /// Directory the agent runs in
    pub working_directory: PathBuf,
    /// Tools the agent may use
    pub capabilities: CapabilitySet,
    /// Agentic turn budget
    pub max_turns: u32,
    /// Wall-clock budget; `None` waits indefinitely
    pub timeout: Option<Duration>,
    /// Model override
    pub model: Option<String>,
    /// Start or resume
    pub mode: InvocationMode,
}

/// Raw result of one agent run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvocationOutput {
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
    /// Exit code; `None` when the process was killed
    pub exit_code: Option<i32>,
    /// Whether the wall-clock budget was exceeded
    pub timed_out: bool,
    /// Wall time from spawn to exit or kill
    pub elapsed: Duration,
    /// Whether stdout or stderr hit the capture limit
    pub truncated: bool,
}

impl InvocationOutput {
    /// Whether the process exited with status zero
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Capability to run the agent
///
/// Errors are reserved for failures to run it at all (spawn failure, bad
/// working directory). Timeouts and non-zero exits are reported in the
/// output.
#[async_trait]
pub trait AgentInvoker: Send + Sync + Debug {
    /// Run the agent once
    async fn invoke(&self, request: &InvocationRequest) -> Result<InvocationOutput>;
}
