//! Read-only capability allow-list
//!
//! The agent only ever receives exploration tools. Write and execute tools
//! are rejected when the set is built and are always passed to the agent as
//! disallowed.

use crate::types::{Result, WorkerError};

/// Tools granted when the caller does not choose
pub const DEFAULT_ALLOWED_TOOLS: &[&str] = &[
    "Read",
    "Grep",
    "Glob",
    "Task",
    "WebSearch",
    "mcp__contextweaver__codebase-retrieval",
];

/// Tools that can modify files or run commands
pub const DISALLOWED_TOOLS: &[&str] = &[
    "Edit",
    "Write",
    "Bash",
    "NotebookEdit",
    "MultiEdit",
    "KillShell",
];

/// Validated set of tools the agent may use
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilitySet {
    allowed: Vec<String>,
}

impl CapabilitySet {
    /// The built-in read-only set
    pub fn read_only() -> Self {
        Self {
            allowed: DEFAULT_ALLOWED_TOOLS.iter().map(|t| (*t).to_string()).collect(),
        }
    }

    /// Build a set from caller-supplied tool names
    ///
    /// Blank entries are skipped and duplicates removed. Any write/execute
    /// tool, including scoped forms like `Bash(git log:*)`, is rejected.
    pub fn new<I, S>(tools: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut allowed: Vec<String> = Vec::new();
        for tool in tools {
            let tool = tool.as_ref().trim();
            if tool.is_empty() {
                continue;
            }
            if is_write_capability(tool) {
                return Err(WorkerError::capability_denied(tool));
            }
            if !allowed.iter().any(|t| t == tool) {
                allowed.push(tool.to_string());
            }
        }

        if allowed.is_empty() {
            return Err(WorkerError::config_error("allowed tool list is empty"));
        }
        Ok(Self { allowed })
    }

    /// Parse a comma-separated list, as given on the command line
    pub fn parse(list: &str) -> Result<Self> {
        Self::new(list.split(','))
    }

    /// Resolve an optional override, falling back to the read-only set
    pub fn from_override(tools: Option<&[String]>) -> Result<Self> {
        match tools {
            Some(tools) => Self::new(tools),
            None => Ok(Self::read_only()),
        }
    }

    /// Allowed tool names
    pub fn allowed(&self) -> &[String] {
        &self.allowed
    }

    /// `--allowedTools` value
    pub fn allowed_arg(&self) -> String {
        self.allowed.join(",")
    }

    /// `--disallowedTools` value
    pub fn disallowed_arg() -> String {
        DISALLOWED_TOOLS.join(",")
    }
}

impl Default for CapabilitySet {
    fn default() -> Self {
        Self::read_only()
    }
}

/// Whether a tool name (optionally scoped, `Tool(pattern)`) grants write/execute
pub fn is_write_capability(tool: &str) -> bool {
    let base = tool.split('(').next().unwrap_or(tool).trim();
    DISALLOWED_TOOLS.iter().any(|d| d.eq_ignore_ascii_case(base))
}
