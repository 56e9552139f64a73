//! Command-line interface definitions
//!
//! Global flags control logging; subcommands map one-to-one onto the
//! session manager operations.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::session::{ContinueOptions, ExecOptions};

/// Delegate read-only code analysis to a Claude CLI worker
#[derive(Parser, Debug, Clone)]
#[command(name = "cc-worker")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Operation to run
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Enable diagnostic mode (auto-log to temp file)
    #[arg(short, long, global = true)]
    pub diagnostic: bool,

    /// Log directory (implies diagnostic mode)
    #[arg(short = 'l', long, value_name = "DIR", global = true)]
    pub log_dir: Option<PathBuf>,

    /// Log file name (implies diagnostic mode)
    #[arg(short = 'f', long, value_name = "FILE", global = true)]
    pub log_file: Option<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    /// Note: RUST_LOG env var takes priority over this flag
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (only errors)
    /// Note: RUST_LOG env var takes priority over this flag
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// OpenTelemetry OTLP endpoint (e.g., http://localhost:4317)
    /// Ignored unless built with the otel feature.
    #[arg(long, value_name = "URL", env = "OTEL_EXPORTER_OTLP_ENDPOINT", global = true)]
    pub otel_endpoint: Option<String>,

    /// OpenTelemetry service name
    #[arg(long, value_name = "NAME", default_value = "cc-worker", global = true)]
    pub otel_service_name: String,
}

/// Session operations
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Start a new analysis session
    Exec {
        /// Task for the agent
        task: String,
        /// Directory the agent analyzes (default: current directory)
        #[arg(long, value_name = "DIR")]
        cwd: Option<PathBuf>,
        #[command(flatten)]
        turn: TurnArgs,
    },

    /// Send a follow-up message to an existing session
    Continue {
        /// Session id or unique prefix
        session_id: String,
        /// Answer or follow-up request
        message: String,
        #[command(flatten)]
        turn: TurnArgs,
    },

    /// List sessions, most recent first
    Sessions {
        /// Show at most this many sessions
        #[arg(long, short = 'n')]
        limit: Option<usize>,
    },

    /// Show the full record of a session
    Status {
        /// Session id or unique prefix
        session_id: String,
    },

    /// Delete a session record
    Delete {
        /// Exact session id
        session_id: String,
    },
}

/// Per-turn overrides shared by `exec` and `continue`
#[derive(clap::Args, Debug, Clone, Default, PartialEq)]
pub struct TurnArgs {
    /// Model to use for this turn
    #[arg(long)]
    pub model: Option<String>,

    /// Agentic turn budget (1..=1000)
    #[arg(long, value_name = "N")]
    pub max_turns: Option<u32>,

    /// Wall-clock budget in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Comma-separated tool allow-list; write/execute tools are refused
    #[arg(long, value_name = "TOOLS", value_delimiter = ',')]
    pub allowed_tools: Option<Vec<String>>,
}

impl TurnArgs {
    fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }

    /// Overrides for `exec`
    pub fn exec_options(&self) -> ExecOptions {
        ExecOptions {
            model: self.model.clone(),
            max_turns: self.max_turns,
            timeout: self.timeout(),
            allowed_tools: self.allowed_tools.clone(),
        }
    }

    /// Overrides for `continue`
    pub fn continue_options(&self) -> ContinueOptions {
        ContinueOptions {
            model: self.model.clone(),
            max_turns: self.max_turns,
            timeout: self.timeout(),
            allowed_tools: self.allowed_tools.clone(),
        }
    }
}

#[allow(clippy::derivable_impls)]
impl Default for Cli {
    fn default() -> Self {
        Self {
            command: None,
            diagnostic: false,
            log_dir: None,
            log_file: None,
            verbose: 0,
            quiet: false,
            log_json: false,
            otel_endpoint: None,
            otel_service_name: "cc-worker".to_string(),
        }
    }
}

impl Cli {
    /// Check if diagnostic mode is enabled (output to file)
    ///
    /// Returns true if `--diagnostic` is set, or if `--log-dir` or `--log-file` is specified.
    pub fn is_diagnostic(&self) -> bool {
        self.diagnostic || self.log_dir.is_some() || self.log_file.is_some()
    }

    /// Get the log level based on CLI arguments
    ///
    /// - `--quiet`: ERROR
    /// - default: WARN
    /// - `-v`: INFO
    /// - `-vv`: DEBUG
    /// - `-vvv` or more: TRACE
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else {
            match self.verbose {
                0 => tracing::Level::WARN,
                1 => tracing::Level::INFO,
                2 => tracing::Level::DEBUG,
                _ => tracing::Level::TRACE,
            }
        }
    }

    /// Get the log file path for diagnostic mode
    ///
    /// Uses the specified log directory and file name, or defaults to:
    /// - Directory: system temp directory
    /// - File: `cc-worker-{timestamp}.log`
    pub fn log_path(&self) -> PathBuf {
        let dir = self.log_dir.clone().unwrap_or_else(std::env::temp_dir);

        let filename = self.log_file.clone().unwrap_or_else(|| {
            let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
            format!("cc-worker-{timestamp}.log")
        });

        dir.join(filename)
    }
}
