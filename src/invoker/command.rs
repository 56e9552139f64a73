//! CLI command building for the agent process

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use super::capabilities::CapabilitySet;
use super::{InvocationMode, InvocationRequest};

/// Environment variables that change how the agent loads code
///
/// Entries from settings with these names are never passed to the agent.
pub const DANGEROUS_ENV_VARS: &[&str] = &[
    "LD_PRELOAD",
    "LD_LIBRARY_PATH",
    "DYLD_INSERT_LIBRARIES",
    "DYLD_LIBRARY_PATH",
    "PATH",
    "NODE_OPTIONS",
    "PYTHONPATH",
    "PERL5LIB",
    "RUBYLIB",
];

/// Set by a running agent; a nested agent refuses to start when it is present
pub const NESTED_SESSION_ENV: &str = "CLAUDECODE";

/// Command builder for one agent invocation
#[derive(Debug)]
pub struct CommandBuilder<'a> {
    program: &'a Path,
    prefix_args: &'a [String],
    env: &'a HashMap<String, String>,
    request: &'a InvocationRequest,
}

impl<'a> CommandBuilder<'a> {
    /// Create a new command builder
    pub fn new(
        program: &'a Path,
        prefix_args: &'a [String],
        env: &'a HashMap<String, String>,
        request: &'a InvocationRequest,
    ) -> Self {
        Self {
            program,
            prefix_args,
            env,
            request,
        }
    }

    /// Arguments after the program, in order
    pub fn args(&self) -> Vec<String> {
        let request = self.request;
        let mut args: Vec<String> = self.prefix_args.to_vec();

        args.push("-p".to_string());
        args.push(request.prompt.clone());

        if let InvocationMode::Resume { continuation_token } = &request.mode {
            args.push("--resume".to_string());
            args.push(continuation_token.clone());
        }

        args.push("--output-format".to_string());
        args.push("json".to_string());
        args.push("--max-turns".to_string());
        args.push(request.max_turns.to_string());

        if let InvocationMode::Start {
            session_id,
            system_prompt,
        } = &request.mode
        {
            args.push("--session-id".to_string());
            args.push(session_id.clone());
            if !system_prompt.is_empty() {
                args.push("--append-system-prompt".to_string());
                args.push(system_prompt.clone());
            }
        }

        self.add_tool_args(&mut args);

        if let Some(ref model) = request.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }

        args
    }

    fn add_tool_args(&self, args: &mut Vec<String>) {
        args.push("--allowedTools".to_string());
        args.push(self.request.capabilities.allowed_arg());
        args.push("--disallowedTools".to_string());
        args.push(CapabilitySet::disallowed_arg());
    }

    /// Environment overrides that survive filtering
    pub fn filtered_env(&self) -> Vec<(&'a str, &'a str)> {
        let mut env: Vec<(&str, &str)> = self
            .env
            .iter()
            .filter(|(key, _)| {
                let dangerous = DANGEROUS_ENV_VARS.contains(&key.as_str());
                if dangerous {
                    tracing::warn!("Ignoring dangerous environment override {}", key);
                }
                !dangerous && key.as_str() != NESTED_SESSION_ENV
            })
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        env.sort_unstable();
        env
    }

    /// Build the complete command, with piped stdout/stderr and null stdin
    pub fn build(&self) -> Command {
        let mut cmd = Command::new(self.program);
        cmd.args(self.args())
            .current_dir(&self.request.working_directory)
            .env_remove(NESTED_SESSION_ENV)
            .envs(self.filtered_env())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

/// Locate the agent binary
///
/// Order: `which claude`, then well-known install locations, else the bare
/// name `claude` so the spawn error names what was missing.
pub fn find_agent_bin() -> PathBuf {
    if let Ok(path) = which::which("claude") {
        return path;
    }

    if let Some(home) = dirs::home_dir() {
        let locations = [
            home.join(".claude").join("local").join("claude"),
            home.join(".npm-global").join("bin").join("claude"),
            home.join(".local").join("bin").join("claude"),
            PathBuf::from("/usr/local/bin/claude"),
        ];
        for path in locations {
            if path.is_file() {
                return path;
            }
        }
    }

    PathBuf::from("claude")
}
