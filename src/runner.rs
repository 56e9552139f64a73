//! Command runner
//!
//! Wires configuration, store and invoker into a [`SessionManager`] and turns
//! one CLI command into a JSON document plus a process exit status.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::cli::{Cli, Command};
use crate::invoker::CliInvoker;
use crate::session::SessionManager;
use crate::settings::SettingsManager;
use crate::store::{FileSessionStore, SessionStore};
use crate::tracing::{ErrorTraceExt, init_logging};
use crate::types::{EnvOverrides, Result, WorkerConfig, WorkerError, WorkerResponse};

/// Exit status for a recorded turn whose status is `failed`
pub const EXIT_FAILED_TURN: i32 = 2;

/// JSON document to print and the exit status to return
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutput {
    pub body: serde_json::Value,
    pub exit_code: i32,
}

impl CommandOutput {
    fn ok<T: Serialize>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(body) => Self { body, exit_code: 0 },
            Err(e) => Self::error(&WorkerError::from(e)),
        }
    }

    fn response(response: &WorkerResponse) -> Self {
        let mut output = Self::ok(response);
        if output.exit_code == 0 && response.status.is_failed() {
            output.exit_code = EXIT_FAILED_TURN;
        }
        output
    }

    fn error(error: &WorkerError) -> Self {
        error.trace_error();
        Self {
            body: error.to_json(),
            exit_code: error.error_code().code(),
        }
    }
}

/// Open the file-backed store and resolve configuration for `command`
pub fn build_manager(env: &EnvOverrides, command: &Command, current_dir: &Path) -> Result<SessionManager> {
    let store: Arc<dyn SessionStore> = Arc::new(FileSessionStore::open(env.sessions_dir()?)?);
    let project = project_dir(command, current_dir, store.as_ref());
    let settings = SettingsManager::new(env.home_dir()?, &project)?;
    let config = WorkerConfig::resolve(env, settings.settings())?;

    let invoker = CliInvoker::from_config(&config);
    tracing::debug!(
        home = %config.home_dir.display(),
        project = %project.display(),
        agent = %invoker.program().display(),
        "Resolved configuration"
    );
    Ok(SessionManager::new(store, Arc::new(invoker), config))
}

/// Directory whose project settings apply to `command`
///
/// `continue` uses the directory the session was started in; an id that
/// does not resolve falls back to `current_dir`.
pub fn project_dir(command: &Command, current_dir: &Path, store: &dyn SessionStore) -> PathBuf {
    match command {
        Command::Exec { cwd: Some(cwd), .. } => current_dir.join(cwd),
        Command::Continue { session_id, .. } => store
            .resolve(session_id)
            .and_then(|id| store.get(&id))
            .map(|record| record.working_directory)
            .unwrap_or_else(|_| current_dir.to_path_buf()),
        _ => current_dir.to_path_buf(),
    }
}

/// Run one command against `manager`
pub async fn execute(manager: &SessionManager, command: Command, current_dir: &Path) -> CommandOutput {
    match command {
        Command::Exec { task, cwd, turn } => {
            let working_directory = cwd.map_or_else(|| current_dir.to_path_buf(), |cwd| current_dir.join(cwd));
            match manager.exec(&task, &working_directory, turn.exec_options()).await {
                Ok(response) => CommandOutput::response(&response),
                Err(e) => CommandOutput::error(&e),
            }
        }
        Command::Continue {
            session_id,
            message,
            turn,
        } => match manager
            .continue_session(&session_id, &message, turn.continue_options())
            .await
        {
            Ok(response) => CommandOutput::response(&response),
            Err(e) => CommandOutput::error(&e),
        },
        Command::Sessions { limit } => match manager.list(limit) {
            Ok(sessions) => CommandOutput::ok(&sessions),
            Err(e) => CommandOutput::error(&e),
        },
        Command::Status { session_id } => match manager.status(&session_id) {
            Ok(record) => CommandOutput::ok(&record),
            Err(e) => CommandOutput::error(&e),
        },
        Command::Delete { session_id } => match manager.delete(&session_id) {
            Ok(deleted) => CommandOutput::ok(&serde_json::json!({
                "session_id": session_id,
                "deleted": deleted,
            })),
            Err(e) => CommandOutput::error(&e),
        },
    }
}

/// Run the CLI: initialise logging, execute the command, print its JSON
///
/// Returns the process exit status.
pub async fn run_with_cli(cli: &Cli) -> anyhow::Result<i32> {
    init_logging(cli)?;

    let Some(command) = cli.command.clone() else {
        use clap::CommandFactory;
        Cli::command().print_help()?;
        return Ok(EXIT_FAILED_TURN);
    };

    let current_dir = std::env::current_dir()?;
    let env = EnvOverrides::from_env();
    let output = match build_manager(&env, &command, &current_dir) {
        Ok(manager) => execute(&manager, command, &current_dir).await,
        Err(e) => CommandOutput::error(&e),
    };

    println!("{}", serde_json::to_string_pretty(&output.body)?);
    Ok(output.exit_code)
}
