//! Worker invocation adapter
//!
//! The boundary between the orchestrator and the external workers that
//! perform phase tasks. A worker receives a materialized prompt and
//! returns free-form text; no schema is imposed on the response. All
//! structure is recovered downstream by the validation gate and the
//! extraction step.
//!
//! The production backend runs a configured command (for example
//! `claude -p`), feeding the prompt on stdin and capturing stdout as the
//! raw response. Tests substitute a scripted backend through the
//! [`WorkerBackend`] trait.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::contracts::Role;
use crate::types::PhaseId;

/// Cap on captured stderr carried in worker failures
const STDERR_TAIL_BYTES: usize = 2048;

/// Worker invocation failures
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The invocation exceeded its deadline and was killed
    #[error("Worker timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// The worker command could not be started or spoken to
    #[error("Worker unavailable: {reason}")]
    Unavailable { reason: String },

    /// The worker ran but exited non-zero
    #[error("Worker exited with status {status}: {stderr_tail}")]
    Failed { status: i32, stderr_tail: String },
}

/// One invocation request.
///
/// `feedback_history` carries the corrective messages from earlier failed
/// attempts, oldest first; it is empty on the first attempt.
#[derive(Debug, Clone)]
pub struct WorkerRequest {
    pub phase_id: PhaseId,
    pub role: Role,
    pub task_description: String,
    pub context_refs: Vec<String>,
    pub feedback_history: Vec<String>,
}

impl WorkerRequest {
    pub fn new(phase_id: PhaseId, role: Role, task_description: impl Into<String>) -> Self {
        Self {
            phase_id,
            role,
            task_description: task_description.into(),
            context_refs: Vec::new(),
            feedback_history: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_context_refs(mut self, refs: Vec<String>) -> Self {
        self.context_refs = refs;
        self
    }

    #[must_use]
    pub fn with_feedback_history(mut self, feedback: Vec<String>) -> Self {
        self.feedback_history = feedback;
        self
    }
}

/// Render a request into the prompt text sent to the worker.
///
/// Deterministic: the same request always materializes the same prompt.
#[must_use]
pub fn materialize_prompt(request: &WorkerRequest) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!("Role: {}\n", request.role));
    prompt.push_str(&format!("Phase: {}\n\n", request.phase_id));
    prompt.push_str(&request.task_description);
    prompt.push('\n');

    if !request.context_refs.is_empty() {
        prompt.push_str("\nContext:\n");
        for context_ref in &request.context_refs {
            prompt.push_str(&format!("- {context_ref}\n"));
        }
    }

    if !request.feedback_history.is_empty() {
        prompt.push_str("\nFeedback from previous attempts:\n");
        for (i, feedback) in request.feedback_history.iter().enumerate() {
            prompt.push_str(&format!("{}. {feedback}\n", i + 1));
        }
    }

    prompt
}

/// Backend that delivers a request to a worker and returns its raw
/// textual response
#[async_trait]
pub trait WorkerBackend: Send + Sync {
    async fn invoke(&self, request: &WorkerRequest) -> Result<String, WorkerError>;
}

/// Production backend: runs a configured command, prompt on stdin,
/// response on stdout
pub struct CommandWorker {
    argv: Vec<String>,
    timeout: Duration,
}

impl CommandWorker {
    /// # Errors
    /// Returns `WorkerError::Unavailable` when `argv` is empty.
    pub fn new(argv: Vec<String>, timeout: Duration) -> Result<Self, WorkerError> {
        if argv.is_empty() {
            return Err(WorkerError::Unavailable {
                reason: "worker command is empty".to_string(),
            });
        }
        Ok(Self { argv, timeout })
    }
}

#[async_trait]
impl WorkerBackend for CommandWorker {
    async fn invoke(&self, request: &WorkerRequest) -> Result<String, WorkerError> {
        let prompt = materialize_prompt(request);
        let program = &self.argv[0];

        debug!(
            phase_id = %request.phase_id,
            program = %program,
            prompt_bytes = prompt.len(),
            timeout_secs = self.timeout.as_secs(),
            "invoking worker command"
        );

        let mut cmd = Command::new(program);
        cmd.args(&self.argv[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| WorkerError::Unavailable {
            reason: format!("failed to spawn {program}: {e}"),
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .map_err(|e| WorkerError::Unavailable {
                    reason: format!("failed to write worker prompt: {e}"),
                })?;
            stdin
                .shutdown()
                .await
                .map_err(|e| WorkerError::Unavailable {
                    reason: format!("failed to close worker stdin: {e}"),
                })?;
        }

        // kill_on_drop tears the child down when the timeout wins
        let output = match timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(WorkerError::Unavailable {
                    reason: format!("failed to collect worker output: {e}"),
                });
            }
            Err(_) => {
                return Err(WorkerError::Timeout {
                    seconds: self.timeout.as_secs(),
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WorkerError::Failed {
                status: output.status.code().unwrap_or(-1),
                stderr_tail: tail(&stderr, STDERR_TAIL_BYTES),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Last `max_bytes` of `s`, trimmed, with an ellipsis when truncated
fn tail(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.trim_end().to_string();
    }
    let mut start = s.len() - max_bytes;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", s[start..].trim_end())
}
