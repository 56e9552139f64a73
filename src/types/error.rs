//! Error types for cc-worker

use thiserror::Error;

/// Stable error codes reported to callers
///
/// The string form is what the CLI prints in its error JSON; the numeric form
/// is the process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Unknown session id
    NotFound,
    /// Id prefix matched more than one session
    Ambiguous,
    /// Session id already in use
    AlreadyExists,
    /// Agent binary missing or not executable
    ProcessSpawnFailure,
    /// Caller input rejected before any work happened
    InvalidInput,
    /// A write/execute capability was requested
    CapabilityDenied,
    /// Too many consecutive failed turns
    RetryLimitExceeded,
    /// Another turn is in flight for the same session
    Busy,
    /// Configuration could not be resolved
    ConfigError,
    /// Store or serialization failure
    InternalError,
}

impl ErrorCode {
    /// Process exit status for this code
    pub fn code(self) -> i32 {
        match self {
            ErrorCode::ProcessSpawnFailure => 3,
            _ => 1,
        }
    }

    /// Snake-case name used in JSON output
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::NotFound => "not_found",
            ErrorCode::Ambiguous => "ambiguous",
            ErrorCode::AlreadyExists => "already_exists",
            ErrorCode::ProcessSpawnFailure => "process_spawn_failure",
            ErrorCode::InvalidInput => "invalid_input",
            ErrorCode::CapabilityDenied => "capability_denied",
            ErrorCode::RetryLimitExceeded => "retry_limit_exceeded",
            ErrorCode::Busy => "busy",
            ErrorCode::ConfigError => "config_error",
            ErrorCode::InternalError => "internal_error",
        }
    }
}

/// Main error type for cc-worker
///
/// Protocol failures and timeouts are not errors: they are recorded on the
/// turn and returned as a `failed` response. Only conditions that prevent a
/// turn from being recorded at all end up here.
#[derive(Debug, Error)]
pub enum WorkerError {
    // === Session errors ===
    /// Session not found
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Id prefix is not unique
    #[error("Session id prefix '{prefix}' matches {count} sessions")]
    AmbiguousSession { prefix: String, count: usize },

    /// Session already exists
    #[error("Session already exists: {0}")]
    SessionAlreadyExists(String),

    /// Session id contains characters that are not allowed
    #[error("Invalid session id: {0}")]
    InvalidSessionId(String),

    /// A turn is already running for this session in this process
    #[error("Session {0} already has a turn in flight")]
    SessionBusy(String),

    /// Too many consecutive failed turns
    #[error("Session {session_id} has failed {failures} consecutive turns (limit {limit}); start a new session with exec")]
    RetryLimitExceeded {
        session_id: String,
        failures: u32,
        limit: u32,
    },

    /// A store update tried to break a record invariant
    #[error("Session record invariant violated: {0}")]
    InvariantViolation(String),

    // === Process errors ===
    /// The agent process could not be started
    #[error("Failed to start agent '{program}': {message}")]
    ProcessSpawnFailure { program: String, message: String },

    /// Working directory missing or not a directory
    #[error("Invalid working directory {path}: {message}")]
    InvalidWorkingDirectory { path: String, message: String },

    /// A write/execute capability was requested
    #[error("Capability not permitted for read-only analysis: {0}")]
    CapabilityDenied(String),

    // === Input errors ===
    /// Empty task or message
    #[error("Prompt cannot be empty")]
    EmptyPrompt,

    // === Configuration errors ===
    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // === External errors ===
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic errors ===
    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for cc-worker
pub type Result<T> = std::result::Result<T, WorkerError>;

impl WorkerError {
    /// Get the stable error code for this error
    pub fn error_code(&self) -> ErrorCode {
        match self {
            WorkerError::SessionNotFound(_) => ErrorCode::NotFound,
            WorkerError::AmbiguousSession { .. } => ErrorCode::Ambiguous,
            WorkerError::SessionAlreadyExists(_) => ErrorCode::AlreadyExists,
            WorkerError::InvalidSessionId(_) => ErrorCode::InvalidInput,
            WorkerError::SessionBusy(_) => ErrorCode::Busy,
            WorkerError::RetryLimitExceeded { .. } => ErrorCode::RetryLimitExceeded,
            WorkerError::InvariantViolation(_) => ErrorCode::InternalError,
            WorkerError::ProcessSpawnFailure { .. } => ErrorCode::ProcessSpawnFailure,
            WorkerError::InvalidWorkingDirectory { .. } => ErrorCode::InvalidInput,
            WorkerError::CapabilityDenied(_) => ErrorCode::CapabilityDenied,
            WorkerError::EmptyPrompt => ErrorCode::InvalidInput,
            WorkerError::ConfigError(_) => ErrorCode::ConfigError,
            WorkerError::Io(_) => ErrorCode::InternalError,
            WorkerError::Json(_) => ErrorCode::InternalError,
            WorkerError::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, WorkerError::SessionBusy(_) | WorkerError::Io(_))
    }

    /// Check if this error is a client error (caused by invalid input)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            WorkerError::SessionNotFound(_)
                | WorkerError::AmbiguousSession { .. }
                | WorkerError::InvalidSessionId(_)
                | WorkerError::InvalidWorkingDirectory { .. }
                | WorkerError::CapabilityDenied(_)
                | WorkerError::EmptyPrompt
                | WorkerError::RetryLimitExceeded { .. }
        )
    }

    /// JSON body printed by the CLI for this error
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "error": self.to_string(),
            "code": self.error_code().as_str(),
        })
    }

    // === Constructor helpers ===

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        WorkerError::Internal(msg.into())
    }

    /// Create a session not found error
    pub fn session_not_found(session_id: impl Into<String>) -> Self {
        WorkerError::SessionNotFound(session_id.into())
    }

    /// Create a session already exists error
    pub fn session_already_exists(session_id: impl Into<String>) -> Self {
        WorkerError::SessionAlreadyExists(session_id.into())
    }

    /// Create a process spawn failure
    pub fn spawn_failure(program: impl Into<String>, message: impl Into<String>) -> Self {
        WorkerError::ProcessSpawnFailure {
            program: program.into(),
            message: message.into(),
        }
    }

    /// Create an invalid working directory error
    pub fn invalid_working_directory(
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        WorkerError::InvalidWorkingDirectory {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a capability denied error
    pub fn capability_denied(tool: impl Into<String>) -> Self {
        WorkerError::CapabilityDenied(tool.into())
    }

    /// Create an invariant violation error
    pub fn invariant(msg: impl Into<String>) -> Self {
        WorkerError::InvariantViolation(msg.into())
    }

    /// Create a configuration error
    pub fn config_error(msg: impl Into<String>) -> Self {
        WorkerError::ConfigError(msg.into())
    }
}
