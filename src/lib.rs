//! cc-worker
//!
//! Delegates read-only code analysis to the Claude CLI as a worker process
//! and keeps the resulting conversations as resumable sessions.
//!
//! ## Operations
//!
//! - `exec`: start a session with a task in a working directory
//! - `continue`: send a follow-up (or clarification answer) to a session
//! - `sessions`: list sessions, most recent first
//! - `status` / `delete`: inspect or remove one session
//!
//! Every exec/continue returns a [`WorkerResponse`] whose `status` is one of
//! `completed`, `needs_clarification`, `incomplete` or `failed`.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use cc_worker::{CliInvoker, ExecOptions, FileSessionStore, SessionManager, WorkerConfig};
//!
//! # async fn demo() -> cc_worker::Result<()> {
//! let config = WorkerConfig::with_home("/tmp/cc-worker");
//! let store = FileSessionStore::open(config.sessions_dir())?;
//! let invoker = CliInvoker::from_config(&config);
//! let manager = SessionManager::new(Arc::new(store), Arc::new(invoker), config);
//!
//! let response = manager
//!     .exec("Explain the auth flow", std::path::Path::new("."), ExecOptions::default())
//!     .await?;
//! println!("{}", response.analysis);
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration Loading Priority
//!
//! 1. **CLI flags** - per call
//! 2. **Environment Variables** - `CC_WORKER_HOME`, `CC_WORKER_AGENT_BIN`,
//!    `CC_WORKER_MODEL`, `CC_WORKER_MAX_TURNS`, `CC_WORKER_TIMEOUT_SECS`
//! 3. **Project settings** - `<project>/.cc-worker/settings.json`, where the
//!    project is the exec directory or the session's directory on continue.
//!    `agentBin`, `agentArgs`, `env` and `systemPromptFile` are ignored here.
//! 4. **User settings** - `~/.cc-worker/settings.json`
//! 5. **Defaults**
//!
//! ### Example settings.json
//!
//! ```json
//! {
//!   "model": "sonnet",
//!   "maxTurns": 25,
//!   "timeoutSecs": 900,
//!   "allowedTools": ["Read", "Grep", "Glob"]
//! }
//! ```

pub mod cli;
pub mod invoker;
pub mod protocol;
pub mod runner;
pub mod session;
pub mod settings;
pub mod store;
pub mod tracing;
pub mod types;

pub use cli::Cli;
pub use invoker::{AgentInvoker, CapabilitySet, CliInvoker, InvocationOutput, InvocationRequest};
pub use protocol::{ExtractionError, extract};
pub use runner::run_with_cli;
pub use session::{ContinueOptions, ExecOptions, SessionManager};
pub use settings::{Settings, SettingsManager};
pub use store::{FileSessionStore, MemorySessionStore, SessionStore};
pub use self::tracing::shutdown_otel;
pub use types::{
    Result, SessionRecord, SessionStatus, SessionSummary, StructuredResult, WorkerConfig,
    WorkerError, WorkerResponse,
};
