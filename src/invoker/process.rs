//! Agent process execution
//!
//! Spawns the agent in its own process group, drains stdout and stderr into
//! capped buffers while it runs, and kills the whole group when the
//! wall-clock budget runs out.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
#[cfg(windows)]
use process_wrap::tokio::JobObject;
#[cfg(unix)]
use process_wrap::tokio::ProcessGroup;
use process_wrap::tokio::{CommandWrap, KillOnDrop};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::types::{Result, WorkerConfig, WorkerError};

use super::command::{CommandBuilder, find_agent_bin};
use super::wrapped_child::WrappedChild;
use super::{AgentInvoker, InvocationOutput, InvocationRequest};

/// Per-stream capture limit
pub const DEFAULT_OUTPUT_LIMIT: usize = 8 * 1024 * 1024;

/// How long to wait for the readers to hit EOF after the process is gone
const READER_GRACE: Duration = Duration::from_secs(2);

const READ_CHUNK: usize = 8192;

/// Bytes captured from one stream
#[derive(Debug, Default)]
struct CaptureBuffer {
    bytes: Vec<u8>,
    truncated: bool,
}

impl CaptureBuffer {
    fn push(&mut self, chunk: &[u8], limit: usize) {
        let room = limit.saturating_sub(self.bytes.len());
        if chunk.len() > room {
            self.truncated = true;
        }
        self.bytes.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }

    fn to_text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Invoker that runs the agent CLI as a subprocess
#[derive(Debug, Clone)]
pub struct CliInvoker {
    program: PathBuf,
    prefix_args: Vec<String>,
    env: HashMap<String, String>,
    output_limit: usize,
}

impl CliInvoker {
    /// Create an invoker for the given program
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            prefix_args: Vec::new(),
            env: HashMap::new(),
            output_limit: DEFAULT_OUTPUT_LIMIT,
        }
    }

    /// Create an invoker from resolved configuration
    pub fn from_config(config: &WorkerConfig) -> Self {
        let program = config.agent_bin.clone().unwrap_or_else(find_agent_bin);
        Self::new(program)
            .with_args(config.agent_args.clone())
            .with_env(config.env.clone())
    }

    /// Arguments placed before the generated ones
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prefix_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Extra environment for the agent
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Per-stream capture limit in bytes
    pub fn with_output_limit(mut self, limit: usize) -> Self {
        self.output_limit = limit;
        self
    }

    /// Program that will be spawned
    pub fn program(&self) -> &PathBuf {
        &self.program
    }

    fn spawn(&self, request: &InvocationRequest) -> Result<WrappedChild> {
        let builder = CommandBuilder::new(&self.program, &self.prefix_args, &self.env, request);
        tracing::debug!(
            program = %self.program.display(),
            cwd = %request.working_directory.display(),
            "Spawning agent with args {:?}",
            builder.args()
        );

        let mut wrap = CommandWrap::from(builder.build());
        #[cfg(unix)]
        wrap.wrap(ProcessGroup::leader());
        #[cfg(windows)]
        wrap.wrap(JobObject);
        wrap.wrap(KillOnDrop);

        let child = wrap.spawn().map_err(|e| {
            WorkerError::spawn_failure(self.program.display().to_string(), e.to_string())
        })?;
        Ok(WrappedChild::new(child))
    }
}

#[async_trait]
impl AgentInvoker for CliInvoker {
    async fn invoke(&self, request: &InvocationRequest) -> Result<InvocationOutput> {
        let cwd = &request.working_directory;
        if !cwd.is_dir() {
            return Err(WorkerError::invalid_working_directory(
                cwd.display().to_string(),
                "not an existing directory",
            ));
        }

        let started = Instant::now();
        let mut child = self.spawn(request)?;
        let pid = child.id();
        tracing::info!(pid, "Agent process started");

        let stdout_buf = Arc::new(Mutex::new(CaptureBuffer::default()));
        let stderr_buf = Arc::new(Mutex::new(CaptureBuffer::default()));

        let stdout = child
            .take_stdout()
            .ok_or_else(|| WorkerError::internal("agent stdout was not piped"))?;
        let stderr = child
            .take_stderr()
            .ok_or_else(|| WorkerError::internal("agent stderr was not piped"))?;

        let mut stdout_task = spawn_reader(stdout, Arc::clone(&stdout_buf), self.output_limit);
        let mut stderr_task = spawn_reader(stderr, Arc::clone(&stderr_buf), self.output_limit);

        let status = match request.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => Some(status?),
                Err(_) => {
                    tracing::warn!(pid, ?limit, "Agent exceeded its time budget, killing process group");
                    if let Err(e) = child.kill().await {
                        tracing::warn!(pid, "Failed to kill agent process group: {}", e);
                    }
                    None
                }
            },
            None => Some(child.wait().await?),
        };
        let elapsed = started.elapsed();

        let readers_done = tokio::time::timeout(
            READER_GRACE,
            join_readers(&mut stdout_task, &mut stderr_task),
        )
        .await;
        if readers_done.is_err() {
            tracing::warn!(pid, "Output readers still open after exit, using captured output");
            stdout_task.abort();
            stderr_task.abort();
        }

        let stdout = stdout_buf.lock().await;
        let stderr = stderr_buf.lock().await;
        let output = InvocationOutput {
            stdout: stdout.to_text(),
            stderr: stderr.to_text(),
            exit_code: status.and_then(|s| s.code()),
            timed_out: status.is_none(),
            elapsed,
            truncated: stdout.truncated || stderr.truncated,
        };

        match output.exit_code {
            Some(0) => tracing::info!(pid, ?elapsed, "Agent exited"),
            code => tracing::warn!(
                pid,
                ?code,
                timed_out = output.timed_out,
                ?elapsed,
                "Agent exited abnormally"
            ),
        }
        Ok(output)
    }
}

fn spawn_reader<R>(
    mut reader: R,
    buffer: Arc<Mutex<CaptureBuffer>>,
    limit: usize,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => buffer.lock().await.push(&chunk[..n], limit),
                Err(e) => {
                    tracing::debug!("Agent output stream closed with error: {}", e);
                    break;
                }
            }
        }
    })
}

async fn join_readers(stdout: &mut JoinHandle<()>, stderr: &mut JoinHandle<()>) {
    for handle in [stdout, stderr] {
        if let Err(e) = handle.await {
            tracing::debug!("Output reader task ended abnormally: {}", e);
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::invoker::{CapabilitySet, InvocationMode};
    use pretty_assertions::assert_eq;
    use serial_test::serial;
    use tempfile::TempDir;

    fn stub(script: &str) -> CliInvoker {
        CliInvoker::new("/bin/sh").with_args(["-c", script, "stub-agent"])
    }

    fn request(cwd: &std::path::Path, timeout: Option<Duration>) -> InvocationRequest {
        InvocationRequest {
            prompt: "describe repo".to_string(),
            working_directory: cwd.to_path_buf(),
            capabilities: CapabilitySet::read_only(),
            max_turns: 5,
            timeout,
            model: None,
            mode: InvocationMode::Start {
                session_id: "s-1".to_string(),
                system_prompt: String::new(),
            },
        }
    }

    #[tokio::test]
    #[serial]
    async fn test_captures_stdout() {
        let dir = TempDir::new().unwrap();
        let invoker = stub(r#"printf '%s' '{"status":"completed","analysis":"X"}'"#);

        let output = invoker.invoke(&request(dir.path(), None)).await.unwrap();

        assert_eq!(output.stdout, r#"{"status":"completed","analysis":"X"}"#);
        assert_eq!(output.exit_code, Some(0));
        assert!(output.success());
        assert!(!output.timed_out);
        assert!(!output.truncated);
    }

    #[tokio::test]
    #[serial]
    async fn test_agent_receives_arguments_and_cwd() {
        let dir = TempDir::new().unwrap();
        let invoker = stub(r#"pwd; printf '%s\n' "$@""#);

        let output = invoker.invoke(&request(dir.path(), None)).await.unwrap();

        let lines: Vec<&str> = output.stdout.lines().collect();
        let expected_cwd = dir.path().canonicalize().unwrap();
        assert_eq!(
            std::path::Path::new(lines[0]).canonicalize().unwrap(),
            expected_cwd
        );
        assert_eq!(lines[1], "-p");
        assert_eq!(lines[2], "describe repo");
        assert!(lines.contains(&"--allowedTools"));
        assert!(lines.contains(&"--session-id"));
    }

    #[tokio::test]
    #[serial]
    async fn test_non_zero_exit_is_reported() {
        let dir = TempDir::new().unwrap();
        let invoker = stub("echo partial; echo boom >&2; exit 7");

        let output = invoker.invoke(&request(dir.path(), None)).await.unwrap();

        assert_eq!(output.exit_code, Some(7));
        assert_eq!(output.stdout, "partial\n");
        assert_eq!(output.stderr, "boom\n");
        assert!(!output.success());
    }

    #[tokio::test]
    #[serial]
    async fn test_timeout_kills_process_group() {
        let dir = TempDir::new().unwrap();
        let invoker = stub("echo started; sleep 5; echo late");

        let started = Instant::now();
        let output = invoker
            .invoke(&request(dir.path(), Some(Duration::from_secs(1))))
            .await
            .unwrap();

        assert!(output.timed_out);
        assert_eq!(output.exit_code, None);
        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(output.stdout, "started\n");
    }

    #[tokio::test]
    #[serial]
    async fn test_output_limit_truncates() {
        let dir = TempDir::new().unwrap();
        let invoker = stub("printf 'abcdefghij'").with_output_limit(4);

        let output = invoker.invoke(&request(dir.path(), None)).await.unwrap();

        assert_eq!(output.stdout, "abcd");
        assert!(output.truncated);
    }

    #[tokio::test]
    #[serial]
    async fn test_missing_binary_is_spawn_failure() {
        let dir = TempDir::new().unwrap();
        let invoker = CliInvoker::new("/nonexistent/cc-worker-agent");

        let err = invoker.invoke(&request(dir.path(), None)).await.unwrap_err();

        assert!(matches!(err, WorkerError::ProcessSpawnFailure { .. }));
    }

    #[tokio::test]
    #[serial]
    async fn test_missing_working_directory() {
        let dir = TempDir::new().unwrap();
        let invoker = stub("true");

        let err = invoker
            .invoke(&request(&dir.path().join("gone"), None))
            .await
            .unwrap_err();

        assert!(matches!(err, WorkerError::InvalidWorkingDirectory { .. }));
    }
}
