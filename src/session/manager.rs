//! Session manager
//!
//! Composes the store, the invoker and the extractor into the user-facing
//! operations. Turns on one session are serialized through a per-id async
//! mutex held in a DashMap; distinct sessions run independently.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::invoker::{AgentInvoker, CapabilitySet, InvocationMode, InvocationRequest};
use crate::store::SessionStore;
use crate::types::{
    Result, SessionRecord, SessionSummary, WorkerConfig, WorkerError, WorkerResponse,
    validate_max_turns,
};

use super::outcome::classify;

/// Per-call overrides for `exec`
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Model override
    pub model: Option<String>,
    /// Agentic turn budget
    pub max_turns: Option<u32>,
    /// Wall-clock budget
    pub timeout: Option<Duration>,
    /// Capability allow-list; write/execute tools are refused
    pub allowed_tools: Option<Vec<String>>,
}

/// Per-call overrides for `continue`
#[derive(Debug, Clone, Default)]
pub struct ContinueOptions {
    /// Model override; defaults to the model the session started with
    pub model: Option<String>,
    /// Agentic turn budget
    pub max_turns: Option<u32>,
    /// Wall-clock budget
    pub timeout: Option<Duration>,
    /// Capability allow-list; write/execute tools are refused
    pub allowed_tools: Option<Vec<String>>,
}

/// Orchestrates sessions over an injected store and invoker
#[derive(Debug)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    invoker: Arc<dyn AgentInvoker>,
    config: WorkerConfig,
    /// One mutex per session id with a turn in flight or recently run
    turn_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SessionManager {
    /// Create a session manager
    pub fn new(
        store: Arc<dyn SessionStore>,
        invoker: Arc<dyn AgentInvoker>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            invoker,
            config,
            turn_locks: DashMap::new(),
        }
    }

    /// Resolved configuration
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Start a new session
    ///
    /// The record is created only after the agent ran, so a spawn failure
    /// leaves nothing behind.
    pub async fn exec(
        &self,
        task: &str,
        working_directory: &Path,
        options: ExecOptions,
    ) -> Result<WorkerResponse> {
        if task.trim().is_empty() {
            return Err(WorkerError::EmptyPrompt);
        }
        let working_directory = absolute_dir(working_directory)?;
        let capabilities = self.capabilities(options.allowed_tools.as_deref())?;
        let max_turns = self.max_turns(options.max_turns)?;
        let timeout = options.timeout.unwrap_or(self.config.timeout);
        let model = options.model.or_else(|| self.config.model.clone());

        let session_id = uuid::Uuid::new_v4().to_string();
        tracing::info!(session_id = %session_id, cwd = %working_directory.display(), "Starting session");

        let request = InvocationRequest {
            prompt: task.to_string(),
            working_directory: working_directory.clone(),
            capabilities,
            max_turns,
            timeout: Some(timeout),
            model: model.clone(),
            mode: InvocationMode::Start {
                session_id: session_id.clone(),
                system_prompt: self.config.system_prompt.clone(),
            },
        };
        let output = self.invoker.invoke(&request).await?;
        let outcome = classify(task, &output, Some(timeout));

        let mut record = SessionRecord::new(session_id, working_directory, model, outcome.turn);
        if let Some(token) = outcome.continuation_token {
            record.continuation_token = token;
        }
        self.store.create(&record)?;
        tracing::info!(session_id = %record.id, status = %record.status, "Session created");

        record
            .latest_response()
            .ok_or_else(|| WorkerError::internal("new session has no turns"))
    }

    /// Send a follow-up message to an existing session
    ///
    /// Accepts a unique id prefix. Refused once the configured number of
    /// consecutive turns have failed.
    pub async fn continue_session(
        &self,
        id_or_prefix: &str,
        message: &str,
        options: ContinueOptions,
    ) -> Result<WorkerResponse> {
        if message.trim().is_empty() {
            return Err(WorkerError::EmptyPrompt);
        }
        let session_id = self.store.resolve(id_or_prefix)?;
        let capabilities = self.capabilities(options.allowed_tools.as_deref())?;
        let max_turns = self.max_turns(options.max_turns)?;
        let timeout = options.timeout.unwrap_or(self.config.timeout);

        let _turn = self.acquire_turn(&session_id, timeout).await?;
        let record = self.store.get(&session_id)?;

        let failures = record.consecutive_failures();
        let limit = self.config.max_consecutive_failures;
        if limit > 0 && failures >= limit {
            return Err(WorkerError::RetryLimitExceeded {
                session_id,
                failures,
                limit,
            });
        }

        let model = options
            .model
            .clone()
            .or_else(|| record.model.clone())
            .or_else(|| self.config.model.clone());
        tracing::info!(session_id = %session_id, turn = record.transcript.len() + 1, "Continuing session");

        let request = InvocationRequest {
            prompt: message.to_string(),
            working_directory: record.working_directory.clone(),
            capabilities,
            max_turns,
            timeout: Some(timeout),
            model,
            mode: InvocationMode::Resume {
                continuation_token: record.continuation_token.clone(),
            },
        };
        let output = self.invoker.invoke(&request).await?;
        let outcome = classify(message, &output, Some(timeout));

        let mut pending = Some(outcome);
        let updated = self.store.update(&session_id, &mut |rec| {
            if let Some(outcome) = pending.take() {
                rec.append_turn(outcome.turn);
                if let Some(token) = outcome.continuation_token {
                    rec.continuation_token = token;
                }
                if options.model.is_some() {
                    rec.model.clone_from(&options.model);
                }
            }
        })?;
        tracing::info!(session_id = %updated.id, status = %updated.status, "Session updated");

        updated
            .latest_response()
            .ok_or_else(|| WorkerError::internal("updated session has no turns"))
    }

    /// Session summaries, most recent first
    pub fn list(&self, limit: Option<usize>) -> Result<Vec<SessionSummary>> {
        self.store.list(limit)
    }

    /// Full record for an id or unique prefix
    pub fn status(&self, id_or_prefix: &str) -> Result<SessionRecord> {
        let session_id = self.store.resolve(id_or_prefix)?;
        self.store.get(&session_id)
    }

    /// Remove a session by exact id; `false` when it did not exist
    pub fn delete(&self, session_id: &str) -> Result<bool> {
        let deleted = self.store.delete(session_id)?;
        self.turn_locks.remove(session_id);
        if deleted {
            tracing::info!(session_id = %session_id, "Session deleted");
        }
        Ok(deleted)
    }

    fn capabilities(&self, tools: Option<&[String]>) -> Result<CapabilitySet> {
        CapabilitySet::from_override(tools.or(self.config.allowed_tools.as_deref()))
    }

    fn max_turns(&self, requested: Option<u32>) -> Result<u32> {
        let max_turns = requested.unwrap_or(self.config.max_turns);
        validate_max_turns(max_turns)?;
        Ok(max_turns)
    }

    /// Wait for the session's turn lock, giving up after `wait`
    async fn acquire_turn(&self, session_id: &str, wait: Duration) -> Result<TurnGuard<'_>> {
        let lock = Arc::clone(&self.turn_locks.entry(session_id.to_string()).or_default());
        match tokio::time::timeout(wait, lock.lock_owned()).await {
            Ok(guard) => Ok(TurnGuard {
                guard: Some(guard),
                locks: &self.turn_locks,
                session_id: session_id.to_string(),
            }),
            Err(_) => {
                release_idle_lock(&self.turn_locks, session_id);
                Err(WorkerError::SessionBusy(session_id.to_string()))
            }
        }
    }
}

/// Held for the duration of one turn
///
/// On drop the lock is released and its map entry removed unless another
/// caller is waiting on it.
struct TurnGuard<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    session_id: String,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        release_idle_lock(self.locks, &self.session_id);
    }
}

/// Remove the entry for `session_id` when the map holds the only reference
fn release_idle_lock(locks: &DashMap<String, Arc<Mutex<()>>>, session_id: &str) {
    locks.remove_if(session_id, |_, lock| Arc::strong_count(lock) == 1);
}

/// Canonical absolute form of an existing directory
fn absolute_dir(path: &Path) -> Result<PathBuf> {
    let resolved = path
        .canonicalize()
        .map_err(|e| WorkerError::invalid_working_directory(path.display().to_string(), e.to_string()))?;
    if !resolved.is_dir() {
        return Err(WorkerError::invalid_working_directory(
            path.display().to_string(),
            "not a directory",
        ));
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::InvocationOutput;
    use crate::store::{FileSessionStore, MemorySessionStore};
    use crate::types::{FailureKind, SessionStatus};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serial_test::serial;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const COMPLETED: &str = r#"{"status":"completed","summary":"ok","analysis":"X","questions":[],"files_analyzed":["a.py"]}"#;

    #[derive(Debug)]
    enum Reply {
        Output(InvocationOutput),
        SpawnFailure,
    }

    /// Invoker that replays scripted replies and records requests
    #[derive(Debug, Default)]
    struct FakeInvoker {
        replies: std::sync::Mutex<VecDeque<Reply>>,
        requests: std::sync::Mutex<Vec<InvocationRequest>>,
        delay: Option<Duration>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl FakeInvoker {
        fn replying(replies: Vec<Reply>) -> Self {
            Self {
                replies: std::sync::Mutex::new(replies.into()),
                ..Default::default()
            }
        }

        fn requests(&self) -> Vec<InvocationRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AgentInvoker for FakeInvoker {
        async fn invoke(&self, request: &InvocationRequest) -> Result<InvocationOutput> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let reply = self.replies.lock().unwrap().pop_front();
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            match reply {
                Some(Reply::Output(output)) => Ok(output),
                Some(Reply::SpawnFailure) | None => {
                    Err(WorkerError::spawn_failure("fake-agent", "not installed"))
                }
            }
        }
    }

    fn ok(stdout: &str) -> Reply {
        Reply::Output(InvocationOutput {
            stdout: stdout.to_string(),
            exit_code: Some(0),
            elapsed: Duration::from_millis(10),
            ..Default::default()
        })
    }

    fn with_token(stdout: &str, token: &str) -> Reply {
        ok(&serde_json::json!({
            "type": "result",
            "subtype": "success",
            "result": stdout,
            "session_id": token,
        })
        .to_string())
    }

    fn manager(invoker: FakeInvoker) -> (TempDir, Arc<FakeInvoker>, SessionManager) {
        let home = TempDir::new().unwrap();
        let invoker = Arc::new(invoker);
        let manager = SessionManager::new(
            Arc::new(MemorySessionStore::new()),
            Arc::clone(&invoker) as Arc<dyn AgentInvoker>,
            WorkerConfig::with_home(home.path()),
        );
        (home, invoker, manager)
    }

    #[tokio::test]
    async fn test_exec_creates_most_recent_session() {
        let (home, invoker, manager) = manager(FakeInvoker::replying(vec![ok(COMPLETED), ok(COMPLETED)]));

        let first = manager
            .exec("first task", home.path(), ExecOptions::default())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = manager
            .exec("describe repo", home.path(), ExecOptions::default())
            .await
            .unwrap();

        assert_eq!(second.status, SessionStatus::Completed);
        assert_eq!(second.analysis, "X");
        assert_eq!(second.files_analyzed, vec!["a.py".to_string()]);
        assert!(second.raw_output.is_none());

        let list = manager.list(None).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].session_id, second.session_id);
        assert_ne!(first.session_id, second.session_id);

        let requests = invoker.requests();
        assert_eq!(
            requests[1].mode,
            InvocationMode::Start {
                session_id: second.session_id.clone(),
                system_prompt: manager.config().system_prompt.clone(),
            }
        );
        assert_eq!(requests[1].max_turns, manager.config().max_turns);
    }

    #[tokio::test]
    async fn test_exec_spawn_failure_creates_no_record() {
        let (home, _invoker, manager) = manager(FakeInvoker::replying(vec![Reply::SpawnFailure]));

        let err = manager
            .exec("task", home.path(), ExecOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, WorkerError::ProcessSpawnFailure { .. }));
        assert!(manager.list(None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_exec_rejects_bad_input_before_invoking() {
        let (home, invoker, manager) = manager(FakeInvoker::replying(vec![ok(COMPLETED)]));

        let err = manager
            .exec("   ", home.path(), ExecOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::EmptyPrompt));

        let options = ExecOptions {
            allowed_tools: Some(vec!["Read".to_string(), "Bash".to_string()]),
            ..Default::default()
        };
        let err = manager.exec("task", home.path(), options).await.unwrap_err();
        assert!(matches!(err, WorkerError::CapabilityDenied(_)));

        let err = manager
            .exec("task", &home.path().join("missing"), ExecOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::InvalidWorkingDirectory { .. }));

        let options = ExecOptions {
            max_turns: Some(0),
            ..Default::default()
        };
        assert!(manager.exec("task", home.path(), options).await.is_err());

        assert!(invoker.requests().is_empty());
    }

    #[test]
    fn test_continue_rejects_empty_message() {
        let (_home, invoker, manager) = manager(FakeInvoker::default());

        let err = tokio_test::block_on(manager.continue_session(
            "any",
            "\n\t ",
            ContinueOptions::default(),
        ))
        .unwrap_err();

        assert!(matches!(err, WorkerError::EmptyPrompt));
        assert!(invoker.requests().is_empty());
    }

    #[tokio::test]
    async fn test_continue_unknown_id_is_not_found() {
        let (_home, invoker, manager) = manager(FakeInvoker::default());

        let err = manager
            .continue_session("does-not-exist", "x", ContinueOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, WorkerError::SessionNotFound(_)));

        for malformed in ["no such id!", "../escape"] {
            let err = manager
                .continue_session(malformed, "x", ContinueOptions::default())
                .await
                .unwrap_err();
            assert!(matches!(err, WorkerError::SessionNotFound(_)));
            assert!(matches!(
                manager.status(malformed),
                Err(WorkerError::SessionNotFound(_))
            ));
            assert!(!manager.delete(malformed).unwrap());
        }

        assert!(manager.list(None).unwrap().is_empty());
        assert!(invoker.requests().is_empty());
    }

    #[tokio::test]
    async fn test_continue_resumes_with_agent_token() {
        let clarify = r#"{"status":"needs_clarification","summary":"which?","questions":["Which module?"]}"#;
        let (home, invoker, manager) = manager(FakeInvoker::replying(vec![
            with_token(clarify, "agent-token"),
            ok(COMPLETED),
        ]));

        let first = manager
            .exec("explain auth", home.path(), ExecOptions::default())
            .await
            .unwrap();
        assert_eq!(first.status, SessionStatus::NeedsClarification);
        assert_eq!(first.questions, vec!["Which module?".to_string()]);

        let prefix = &first.session_id[..8];
        let second = manager
            .continue_session(prefix, "the login module", ContinueOptions::default())
            .await
            .unwrap();
        assert_eq!(second.session_id, first.session_id);
        assert_eq!(second.status, SessionStatus::Completed);

        let requests = invoker.requests();
        assert_eq!(
            requests[1].mode,
            InvocationMode::Resume {
                continuation_token: "agent-token".to_string()
            }
        );
        assert_eq!(requests[1].prompt, "the login module");

        let record = manager.status(&first.session_id).unwrap();
        assert_eq!(record.transcript.len(), 2);
        assert_eq!(record.status, SessionStatus::Completed);
        assert_eq!(record.working_directory, home.path().canonicalize().unwrap());
    }

    #[tokio::test]
    async fn test_failed_turn_is_recorded_with_raw_output() {
        let (home, _invoker, manager) =
            manager(FakeInvoker::replying(vec![ok("I looked around but have no answer.")]));

        let response = manager
            .exec("task", home.path(), ExecOptions::default())
            .await
            .unwrap();

        assert_eq!(response.status, SessionStatus::Failed);
        assert_eq!(
            response.failure.unwrap().kind,
            FailureKind::NoStructuredOutput
        );
        assert_eq!(
            response.raw_output.as_deref(),
            Some("I looked around but have no answer.")
        );

        let record = manager.status(&response.session_id).unwrap();
        assert!(record.last_result.is_none());
        assert_eq!(record.transcript.len(), 1);
    }

    #[tokio::test]
    async fn test_retry_limit_after_consecutive_failures() {
        let (home, invoker, manager) = manager(FakeInvoker::replying(vec![
            ok("no block"),
            ok("still no block"),
            ok("nothing again"),
            ok(COMPLETED),
        ]));

        let first = manager
            .exec("task", home.path(), ExecOptions::default())
            .await
            .unwrap();
        let id = first.session_id;

        // Continuing a failed session is allowed until the cap is reached
        for _ in 0..2 {
            let response = manager
                .continue_session(&id, "try again", ContinueOptions::default())
                .await
                .unwrap();
            assert_eq!(response.status, SessionStatus::Failed);
        }

        let err = manager
            .continue_session(&id, "try again", ContinueOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WorkerError::RetryLimitExceeded {
                failures: 3,
                limit: 3,
                ..
            }
        ));
        assert_eq!(invoker.requests().len(), 3);
        assert_eq!(manager.status(&id).unwrap().transcript.len(), 3);
    }

    #[tokio::test]
    async fn test_continue_spawn_failure_leaves_record_untouched() {
        let (home, _invoker, manager) =
            manager(FakeInvoker::replying(vec![ok(COMPLETED), Reply::SpawnFailure]));

        let first = manager
            .exec("task", home.path(), ExecOptions::default())
            .await
            .unwrap();
        let before = manager.status(&first.session_id).unwrap();

        let err = manager
            .continue_session(&first.session_id, "more", ContinueOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, WorkerError::ProcessSpawnFailure { .. }));
        assert_eq!(manager.status(&first.session_id).unwrap(), before);
    }

    #[tokio::test]
    async fn test_timeout_turn_is_failed() {
        let timed_out = Reply::Output(InvocationOutput {
            stdout: String::new(),
            timed_out: true,
            elapsed: Duration::from_secs(1),
            ..Default::default()
        });
        let (home, _invoker, manager) = manager(FakeInvoker::replying(vec![timed_out]));

        let options = ExecOptions {
            timeout: Some(Duration::from_secs(1)),
            ..Default::default()
        };
        let response = manager.exec("task", home.path(), options).await.unwrap();

        assert_eq!(response.status, SessionStatus::Failed);
        assert_eq!(response.failure.unwrap().kind, FailureKind::Timeout);
        assert_eq!(response.exit_code, None);
    }

    #[tokio::test]
    async fn test_status_is_idempotent() {
        let (home, _invoker, manager) = manager(FakeInvoker::replying(vec![ok(COMPLETED)]));
        let response = manager
            .exec("task", home.path(), ExecOptions::default())
            .await
            .unwrap();

        let a = serde_json::to_string(&manager.status(&response.session_id).unwrap()).unwrap();
        let b = serde_json::to_string(&manager.status(&response.session_id).unwrap()).unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_delete_twice() {
        let (home, _invoker, manager) = manager(FakeInvoker::replying(vec![ok(COMPLETED)]));
        let response = manager
            .exec("task", home.path(), ExecOptions::default())
            .await
            .unwrap();

        assert!(manager.delete(&response.session_id).unwrap());
        assert!(!manager.delete(&response.session_id).unwrap());
        assert!(matches!(
            manager.status(&response.session_id),
            Err(WorkerError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_turns_on_one_session_are_serialized() {
        let invoker = FakeInvoker {
            replies: std::sync::Mutex::new(vec![ok(COMPLETED), ok(COMPLETED), ok(COMPLETED)].into()),
            delay: Some(Duration::from_millis(50)),
            ..Default::default()
        };
        let (home, invoker, manager) = manager(invoker);
        let id = manager
            .exec("task", home.path(), ExecOptions::default())
            .await
            .unwrap()
            .session_id;

        let (a, b) = tokio::join!(
            manager.continue_session(&id, "one", ContinueOptions::default()),
            manager.continue_session(&id, "two", ContinueOptions::default()),
        );
        a.unwrap();
        b.unwrap();

        assert_eq!(invoker.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(manager.status(&id).unwrap().transcript.len(), 3);
        assert!(manager.turn_locks.is_empty());
    }

    #[tokio::test]
    async fn test_turn_locks_are_released() {
        let (home, _invoker, manager) = manager(FakeInvoker::replying(vec![ok(COMPLETED), ok(COMPLETED)]));
        let id = manager
            .exec("task", home.path(), ExecOptions::default())
            .await
            .unwrap()
            .session_id;
        assert!(manager.turn_locks.is_empty());

        manager
            .continue_session(&id, "more", ContinueOptions::default())
            .await
            .unwrap();
        assert!(manager.turn_locks.is_empty());

        let held = manager.acquire_turn(&id, Duration::from_secs(1)).await.unwrap();
        let err = manager
            .acquire_turn(&id, Duration::from_millis(20))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, WorkerError::SessionBusy(_)));
        assert_eq!(manager.turn_locks.len(), 1);

        drop(held);
        assert!(manager.turn_locks.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    #[serial]
    async fn test_end_to_end_with_stub_agent() {
        use crate::invoker::CliInvoker;

        let home = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        let config = WorkerConfig::with_home(home.path());
        let store = FileSessionStore::open(config.sessions_dir()).unwrap();
        let script = format!("printf '%s' '{COMPLETED}'");
        let invoker = CliInvoker::new("/bin/sh").with_args(["-c", script.as_str(), "stub-agent"]);
        let manager = SessionManager::new(Arc::new(store), Arc::new(invoker), config);

        let response = manager
            .exec("describe repo", project.path(), ExecOptions::default())
            .await
            .unwrap();
        assert_eq!(response.status, SessionStatus::Completed);

        let record = manager.status(&response.session_id).unwrap();
        assert_eq!(record.status, SessionStatus::Completed);
        assert_eq!(record.last_result.unwrap().analysis, "X");
        assert_eq!(manager.list(None).unwrap()[0].session_id, response.session_id);
        assert!(
            home.path()
                .join("sessions")
                .join(format!("{}.json", response.session_id))
                .is_file()
        );
    }
}
