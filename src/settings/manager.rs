//! Settings manager implementation
//!
//! Handles loading and merging settings from the user and project files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::Result;

/// Settings file locations
const PROJECT_SETTINGS_DIR: &str = ".cc-worker";
const SETTINGS_FILE: &str = "settings.json";

/// cc-worker settings file structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Agent binary to run instead of the discovered `claude`
    #[serde(default)]
    pub agent_bin: Option<PathBuf>,

    /// Arguments placed before the generated agent arguments
    #[serde(default)]
    pub agent_args: Option<Vec<String>>,

    /// Model to use
    #[serde(default)]
    pub model: Option<String>,

    /// Agentic turn budget per invocation
    #[serde(default)]
    pub max_turns: Option<u32>,

    /// Wall-clock budget per invocation, in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Capability allow-list handed to the agent
    #[serde(default)]
    pub allowed_tools: Option<Vec<String>>,

    /// Consecutive failed turns before continue is refused
    #[serde(default)]
    pub max_consecutive_failures: Option<u32>,

    /// File whose contents replace the built-in worker system prompt
    #[serde(default)]
    pub system_prompt_file: Option<PathBuf>,

    /// Custom environment variables for the agent
    #[serde(default)]
    pub env: Option<HashMap<String, String>>,

    /// Unknown keys, kept so newer files still load
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Settings {
    /// Create empty settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge another settings into this one
    ///
    /// Values from `other` take precedence over `self`.
    pub fn merge(&mut self, other: Settings) {
        if other.agent_bin.is_some() {
            self.agent_bin = other.agent_bin;
        }
        if other.agent_args.is_some() {
            self.agent_args = other.agent_args;
        }
        if other.model.is_some() {
            self.model = other.model;
        }
        if other.max_turns.is_some() {
            self.max_turns = other.max_turns;
        }
        if other.timeout_secs.is_some() {
            self.timeout_secs = other.timeout_secs;
        }
        if other.allowed_tools.is_some() {
            self.allowed_tools = other.allowed_tools;
        }
        if other.max_consecutive_failures.is_some() {
            self.max_consecutive_failures = other.max_consecutive_failures;
        }
        if other.system_prompt_file.is_some() {
            self.system_prompt_file = other.system_prompt_file;
        }
        if let Some(other_env) = other.env {
            let env = self.env.get_or_insert_with(HashMap::new);
            env.extend(other_env);
        }
        self.extra.extend(other.extra);
    }

    /// Clear the keys that decide what process runs and how it starts
    ///
    /// Returns the camelCase names of the keys that were set.
    pub fn strip_launch_keys(&mut self) -> Vec<&'static str> {
        let mut stripped = Vec::new();
        if self.agent_bin.take().is_some() {
            stripped.push("agentBin");
        }
        if self.agent_args.take().is_some() {
            stripped.push("agentArgs");
        }
        if self.env.take().is_some() {
            stripped.push("env");
        }
        if self.system_prompt_file.take().is_some() {
            stripped.push("systemPromptFile");
        }
        stripped
    }
}

/// Settings manager for loading and accessing settings
///
/// User settings are trusted. Project settings live inside the analyzed
/// repository, so they may tune the analysis but never choose the agent
/// binary, its arguments, its environment or its prompt file.
#[derive(Debug)]
pub struct SettingsManager {
    /// The merged settings
    settings: Settings,
}

impl SettingsManager {
    /// Create a new settings manager and load settings
    ///
    /// # Arguments
    ///
    /// * `home_dir` - The cc-worker state directory
    /// * `project_dir` - The project working directory
    pub fn new(home_dir: impl AsRef<Path>, project_dir: impl AsRef<Path>) -> Result<Self> {
        let settings = Self::load_all_settings(home_dir.as_ref(), project_dir.as_ref());
        Ok(Self { settings })
    }

    /// Load and merge all settings sources
    ///
    /// Priority: Project > User, launch keys from User only
    fn load_all_settings(home_dir: &Path, project_dir: &Path) -> Settings {
        let mut settings = Settings::new();

        if let Some(user_settings) = Self::load_settings_file(&home_dir.join(SETTINGS_FILE)) {
            tracing::debug!("Loaded user settings from {:?}", home_dir);
            settings.merge(user_settings);
        }

        let project_path = project_dir.join(PROJECT_SETTINGS_DIR).join(SETTINGS_FILE);
        if let Some(mut project_settings) = Self::load_settings_file(&project_path) {
            let stripped = project_settings.strip_launch_keys();
            if !stripped.is_empty() {
                tracing::warn!(
                    "Ignoring {:?} in project settings {:?}; set them in user settings",
                    stripped,
                    project_path
                );
            }
            tracing::debug!("Loaded project settings from {:?}", project_dir);
            settings.merge(project_settings);
        }

        settings
    }

    /// Load settings from a file
    fn load_settings_file(path: &Path) -> Option<Settings> {
        if !path.exists() {
            return None;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(settings) => Some(settings),
                Err(e) => {
                    tracing::warn!("Failed to parse settings file {:?}: {}", path, e);
                    None
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read settings file {:?}: {}", path, e);
                None
            }
        }
    }

    /// Get the merged settings
    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}
