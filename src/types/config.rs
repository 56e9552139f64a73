//! Worker configuration from environment variables and settings files

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::settings::Settings;

use super::error::{Result, WorkerError};

/// Environment variable naming the state directory
pub const ENV_HOME: &str = "CC_WORKER_HOME";
/// Environment variable naming the agent binary
pub const ENV_AGENT_BIN: &str = "CC_WORKER_AGENT_BIN";
/// Environment variable naming the model override
pub const ENV_MODEL: &str = "CC_WORKER_MODEL";
/// Environment variable for the agentic turn budget
pub const ENV_MAX_TURNS: &str = "CC_WORKER_MAX_TURNS";
/// Environment variable for the wall-clock budget in seconds
pub const ENV_TIMEOUT_SECS: &str = "CC_WORKER_TIMEOUT_SECS";

/// Default agentic turn budget per invocation
pub const DEFAULT_MAX_TURNS: u32 = 15;
/// Upper bound accepted for the turn budget
pub const MAX_ALLOWED_TURNS: u32 = 1000;
/// Default wall-clock budget per invocation
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;
/// Default number of consecutive failed turns before continue is refused
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// Directory name under the user's home directory
const STATE_DIR_NAME: &str = ".cc-worker";
/// Directory under the state root holding session records
const SESSIONS_DIR_NAME: &str = "sessions";

/// Appended to the agent's system prompt on the first turn of a session
pub const WORKER_SYSTEM_PROMPT: &str = "You are a read-only code analysis worker. \
Explore the codebase with the tools you are given; never modify files. \
End your final answer with exactly one fenced ```json block of the form \
{\"status\": \"completed|needs_clarification|incomplete\", \"summary\": string, \
\"analysis\": string, \"questions\": [string], \"files_analyzed\": [string]}. \
Use needs_clarification with a non-empty questions list when the task is ambiguous.";

/// Overrides read from environment variables
///
/// Every field is optional; unset or unparsable variables are ignored.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    /// State directory
    /// Environment variable: `CC_WORKER_HOME`
    pub home: Option<PathBuf>,

    /// Agent binary
    /// Environment variable: `CC_WORKER_AGENT_BIN`
    pub agent_bin: Option<PathBuf>,

    /// Model override
    /// Environment variable: `CC_WORKER_MODEL`
    pub model: Option<String>,

    /// Turn budget
    /// Environment variable: `CC_WORKER_MAX_TURNS`
    pub max_turns: Option<u32>,

    /// Timeout in seconds
    /// Environment variable: `CC_WORKER_TIMEOUT_SECS`
    pub timeout_secs: Option<u64>,
}

impl EnvOverrides {
    /// Load overrides from the process environment
    pub fn from_env() -> Self {
        let non_empty = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());

        Self {
            home: non_empty(ENV_HOME).map(PathBuf::from),
            agent_bin: non_empty(ENV_AGENT_BIN).map(PathBuf::from),
            model: non_empty(ENV_MODEL),
            max_turns: non_empty(ENV_MAX_TURNS).and_then(|s| s.trim().parse().ok()),
            timeout_secs: non_empty(ENV_TIMEOUT_SECS).and_then(|s| s.trim().parse().ok()),
        }
    }

    /// State directory: override, else `~/.cc-worker`
    pub fn home_dir(&self) -> Result<PathBuf> {
        if let Some(ref home) = self.home {
            return Ok(home.clone());
        }
        dirs::home_dir()
            .map(|home| home.join(STATE_DIR_NAME))
            .ok_or_else(|| WorkerError::config_error("cannot determine home directory"))
    }

    /// Session records directory under [`EnvOverrides::home_dir`]
    pub fn sessions_dir(&self) -> Result<PathBuf> {
        Ok(self.home_dir()?.join(SESSIONS_DIR_NAME))
    }
}

/// Fully resolved worker configuration
///
/// Priority: environment > project settings > user settings > defaults.
/// CLI flags are applied later, per call, through `ExecOptions`.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// State root (`sessions/` lives below it)
    pub home_dir: PathBuf,
    /// Agent binary; `None` means discover it at spawn time
    pub agent_bin: Option<PathBuf>,
    /// Arguments placed before the generated agent arguments
    pub agent_args: Vec<String>,
    /// Default model override
    pub model: Option<String>,
    /// Default turn budget
    pub max_turns: u32,
    /// Default wall-clock budget
    pub timeout: Duration,
    /// Default capability allow-list; `None` uses the built-in read-only set
    pub allowed_tools: Option<Vec<String>>,
    /// Consecutive failed turns tolerated before continue is refused
    pub max_consecutive_failures: u32,
    /// Text appended to the agent's system prompt on exec
    pub system_prompt: String,
    /// Extra environment passed to the agent
    pub env: HashMap<String, String>,
}

impl WorkerConfig {
    /// Resolve configuration from environment overrides and merged settings
    pub fn resolve(env: &EnvOverrides, settings: &Settings) -> Result<Self> {
        let home_dir = env.home_dir()?;

        let max_turns = env
            .max_turns
            .or(settings.max_turns)
            .unwrap_or(DEFAULT_MAX_TURNS);
        validate_max_turns(max_turns)?;

        let timeout_secs = env
            .timeout_secs
            .or(settings.timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(WorkerError::config_error("timeout must be at least 1 second"));
        }

        let system_prompt = match settings.system_prompt_file {
            Some(ref path) => read_prompt_file(path)?,
            None => WORKER_SYSTEM_PROMPT.to_string(),
        };

        Ok(Self {
            home_dir,
            agent_bin: env.agent_bin.clone().or_else(|| settings.agent_bin.clone()),
            agent_args: settings.agent_args.clone().unwrap_or_default(),
            model: env.model.clone().or_else(|| settings.model.clone()),
            max_turns,
            timeout: Duration::from_secs(timeout_secs),
            allowed_tools: settings.allowed_tools.clone(),
            max_consecutive_failures: settings
                .max_consecutive_failures
                .unwrap_or(DEFAULT_MAX_CONSECUTIVE_FAILURES),
            system_prompt,
            env: settings.env.clone().unwrap_or_default(),
        })
    }

    /// Configuration rooted at `home_dir` with built-in defaults
    pub fn with_home(home_dir: impl Into<PathBuf>) -> Self {
        Self {
            home_dir: home_dir.into(),
            agent_bin: None,
            agent_args: Vec::new(),
            model: None,
            max_turns: DEFAULT_MAX_TURNS,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            allowed_tools: None,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
            system_prompt: WORKER_SYSTEM_PROMPT.to_string(),
            env: HashMap::new(),
        }
    }

    /// Directory holding one JSON file per session
    pub fn sessions_dir(&self) -> PathBuf {
        self.home_dir.join(SESSIONS_DIR_NAME)
    }
}

/// Reject turn budgets outside `1..=1000`
pub fn validate_max_turns(max_turns: u32) -> Result<()> {
    if max_turns == 0 || max_turns > MAX_ALLOWED_TURNS {
        return Err(WorkerError::config_error(format!(
            "max_turns {max_turns} outside 1..={MAX_ALLOWED_TURNS}"
        )));
    }
    Ok(())
}

fn read_prompt_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        WorkerError::config_error(format!(
            "cannot read system prompt file {}: {e}",
            path.display()
        ))
    })
}
