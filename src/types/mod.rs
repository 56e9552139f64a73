//! Public types for cc-worker
//!
//! This module contains all the shared types used across the crate.

mod config;
mod error;
mod result;
mod session;

pub use config::{
    DEFAULT_MAX_CONSECUTIVE_FAILURES, DEFAULT_MAX_TURNS, DEFAULT_TIMEOUT_SECS, ENV_AGENT_BIN,
    ENV_HOME, ENV_MAX_TURNS, ENV_MODEL, ENV_TIMEOUT_SECS, EnvOverrides, MAX_ALLOWED_TURNS,
    WORKER_SYSTEM_PROMPT, WorkerConfig, validate_max_turns,
};
pub use error::{ErrorCode, Result, WorkerError};
pub use result::{
    FailureKind, InvocationMetadata, ResultStatus, SessionStatus, StructuredResult, TurnFailure,
    WorkerResponse,
};
pub use session::{SessionRecord, SessionSummary, Turn};
