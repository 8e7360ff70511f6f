//! Core Task record: one detached Codex invocation and its captured output.
//!
//! # Invariants
//! - `id` is unique within a task directory and never reassigned
//! - `result` is set at most once, on the transition into a terminal state
//! - terminal states are final

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a task.
///
/// # Properties
/// - 32 lowercase hex characters when freshly generated
/// - Immutable once created
/// - Safe to use as a file name stem (see [`TaskId::parse`])
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Create a new unique task ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Accept a caller-supplied id.
    ///
    /// Returns `None` for ids that could escape the task directory or are
    /// empty. Only ASCII alphanumerics, `-` and `_` are allowed.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty()
            || !raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return None;
        }
        Some(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status of a task in its lifecycle.
///
/// # State Machine
/// ```text
/// Pending -> Running -> Completed
///                   \-> Failed
///                   \-> TimedOut
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Id assigned, process not launched yet
    Pending,
    /// Process alive or its output still advancing
    Running,
    /// Process exited with status 0 (or exit unobserved and output idle)
    Completed,
    /// Process exited non-zero or was killed by a signal
    Failed,
    /// A synchronous wait elapsed before the process exited
    TimedOut,
}

impl TaskStatus {
    /// `true` for Completed, Failed and TimedOut.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::TimedOut
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::TimedOut => "timed_out",
        }
    }

    /// Map an observed exit code to a terminal status.
    ///
    /// `None` means the process was terminated by a signal.
    pub fn from_exit_code(code: Option<i32>) -> Self {
        match code {
            Some(0) => TaskStatus::Completed,
            _ => TaskStatus::Failed,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single Codex invocation tracked on disk.
///
/// Serialized as the task's status record (`<id>.meta`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    /// Human-readable command line, for status reports
    command: String,
    status: TaskStatus,
    stdout_path: PathBuf,
    stderr_path: PathBuf,
    started_at: DateTime<Utc>,
    #[serde(default)]
    finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pid: Option<u32>,
    #[serde(default)]
    exit_code: Option<i32>,
    #[serde(default)]
    result: Option<String>,
}

impl Task {
    /// Create a task in the `Pending` state.
    pub fn new(id: TaskId, command: String, stdout_path: PathBuf, stderr_path: PathBuf) -> Self {
        Self {
            id,
            command,
            status: TaskStatus::Pending,
            stdout_path,
            stderr_path,
            started_at: Utc::now(),
            finished_at: None,
            pid: None,
            exit_code: None,
            result: None,
        }
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn stdout_path(&self) -> &Path {
        &self.stdout_path
    }

    pub fn stderr_path(&self) -> &Path {
        &self.stderr_path
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn result(&self) -> Option<&str> {
        self.result.as_deref()
    }

    /// Seconds since launch, or the total run time once terminal.
    pub fn elapsed_secs(&self) -> i64 {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_seconds().max(0)
    }

    /// Record the launched process. Only valid from `Pending`.
    pub fn mark_running(&mut self, pid: u32) -> bool {
        if self.status != TaskStatus::Pending {
            return false;
        }
        self.pid = Some(pid);
        self.status = TaskStatus::Running;
        true
    }

    /// Remember an exit code observed after the task already went terminal
    /// (e.g. a synchronous call that timed out). Does not change the status.
    pub fn note_exit(&mut self, code: Option<i32>) {
        if self.exit_code.is_none() {
            self.exit_code = code;
        }
    }

    /// Transition into a terminal state and store the filtered result.
    ///
    /// Returns `false` and leaves the task untouched if it is already
    /// terminal or `status` is not terminal.
    pub fn finish(&mut self, status: TaskStatus, exit_code: Option<i32>, result: String) -> bool {
        if self.status.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        self.exit_code = exit_code;
        self.result = Some(result);
        self.finished_at = Some(Utc::now());
        true
    }
}
