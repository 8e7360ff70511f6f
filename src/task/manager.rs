//! Task orchestration: launch, wait, poll, filter.
//!
//! ## Task Flow
//! 1. Draw a fresh id and allocate capture files
//! 2. Persist a `pending` record, spawn the detached child, persist `running`
//! 3. Sync: wait (optionally bounded) and finish with the exit code
//! 4. Async: hand the child to a background reaper and return the id
//! 5. Check: cached result if terminal, otherwise probe liveness
//!
//! A running task is finished either by the reaper (exit code known) or by a
//! check that finds the pid dead and the capture idle for `idle_timeout`
//! (exit code unknown, reported as `completed`). While this instance has a
//! reaper attached to a task, only the reaper finishes it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::command::Invocation;
use super::error::{TaskError, TaskResult};
use super::filter;
use super::runner::{self, RunningProcess};
use super::store::{CaptureFiles, TaskStore};
use super::task::{Task, TaskId, TaskStatus};

/// How long a capture file may stay untouched before a dead-pid task counts
/// as finished.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Attempts at drawing an unused id before giving up.
const MAX_ID_ATTEMPTS: usize = 3;

/// Snapshot of a task returned to callers.
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub task_id: TaskId,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    pub command: String,
    pub elapsed_secs: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl From<&Task> for TaskReport {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.id().clone(),
            status: task.status(),
            result: task.result().map(str::to_string),
            command: task.command().to_string(),
            elapsed_secs: task.elapsed_secs(),
            pid: task.pid(),
            exit_code: task.exit_code(),
        }
    }
}

/// Registry of tasks launched or looked up through this instance.
///
/// Cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct TaskManager {
    store: TaskStore,
    idle_timeout: Duration,
    tasks: Arc<RwLock<HashMap<TaskId, Task>>>,
    /// Tasks whose child is being waited on by a background reaper
    reaping: Arc<Mutex<HashSet<TaskId>>>,
}

impl TaskManager {
    pub fn new(store: TaskStore, idle_timeout: Duration) -> Self {
        Self {
            store,
            idle_timeout,
            tasks: Arc::new(RwLock::new(HashMap::new())),
            reaping: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    /// Run to completion (or until `timeout`) and return the filtered result.
    ///
    /// On timeout the task is reported `timed_out` and the child keeps
    /// running in the background; it is never killed.
    pub async fn execute_sync(
        &self,
        invocation: &Invocation,
        timeout: Option<Duration>,
    ) -> TaskResult<TaskReport> {
        let (id, mut process) = self.launch(invocation).await?;

        let waited = match timeout {
            Some(limit) => tokio::time::timeout(limit, process.wait()).await.ok(),
            None => Some(process.wait().await),
        };

        match waited {
            Some(Ok(code)) => self.finish(&id, TaskStatus::from_exit_code(code), code).await,
            Some(Err(e)) => {
                warn!(task_id = %id, "Failed to wait for process: {}", e);
                self.finish(&id, TaskStatus::Failed, None).await
            }
            None => {
                info!(task_id = %id, ?timeout, "Synchronous wait timed out; leaving process running");
                let report = self.finish(&id, TaskStatus::TimedOut, None).await;
                self.reap_in_background(id, process).await;
                report
            }
        }
    }

    /// Launch in the background and return immediately with the task id.
    pub async fn execute_async(&self, invocation: &Invocation) -> TaskResult<TaskReport> {
        let (id, process) = self.launch(invocation).await?;
        let report = self.report(&id).await?;
        self.reap_in_background(id, process).await;
        Ok(report)
    }

    /// Current status of a task; the filtered result once it is terminal.
    ///
    /// Safe to call repeatedly: a terminal task is answered from the cache.
    pub async fn check_result(&self, raw_id: &str) -> TaskResult<TaskReport> {
        let id = TaskId::parse(raw_id).ok_or_else(|| TaskError::NotFound(raw_id.to_string()))?;

        let known = {
            let tasks = self.tasks.read().await;
            tasks.get(&id).map(|task| (task.status(), task.pid()))
        };
        let (status, pid) = match known {
            Some(entry) => entry,
            None => self.adopt(&id).await?,
        };

        if status.is_terminal() {
            return self.report(&id).await;
        }

        let reaped_here = self.reaping.lock().await.contains(&id);
        if reaped_here || self.still_running(&id, pid).await {
            debug!(task_id = %id, ?pid, "Task still running");
            return self.report(&id).await;
        }

        // Exit was not observed by this host; the capture went quiet and the
        // pid is gone. A record without a pid never got its child started.
        let status = match pid {
            Some(_) => TaskStatus::Completed,
            None => TaskStatus::Failed,
        };
        self.finish(&id, status, None).await
    }

    /// Load a task started by another host invocation into the registry.
    async fn adopt(&self, id: &TaskId) -> TaskResult<(TaskStatus, Option<u32>)> {
        let task = self
            .store
            .load(id)
            .await?
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?;
        debug!(task_id = %id, status = %task.status(), "Loaded task record from disk");

        let mut tasks = self.tasks.write().await;
        let task = tasks.entry(id.clone()).or_insert(task);
        Ok((task.status(), task.pid()))
    }

    /// Dual-signal liveness: alive pid OR recently advancing capture.
    async fn still_running(&self, id: &TaskId, pid: Option<u32>) -> bool {
        if pid.is_some_and(runner::is_alive) {
            return true;
        }
        match self.store.last_modified(id).await {
            // A modification time in the future counts as fresh.
            Some(modified) => SystemTime::now()
                .duration_since(modified)
                .map_or(true, |idle| idle < self.idle_timeout),
            None => false,
        }
    }

    async fn launch(&self, invocation: &Invocation) -> TaskResult<(TaskId, RunningProcess)> {
        let (id, files) = self.allocate_fresh().await?;
        let mut task = Task::new(
            id.clone(),
            invocation.display(),
            files.stdout_path.clone(),
            files.stderr_path.clone(),
        );

        if let Err(e) = self.store.save(&task).await {
            self.store.discard(&id).await;
            return Err(e);
        }

        let process = match runner::start(&invocation.program, &invocation.args, files) {
            Ok(process) => process,
            Err(e) => {
                warn!(task_id = %id, "Launch failed: {}", e);
                self.store.discard(&id).await;
                return Err(e);
            }
        };

        task.mark_running(process.pid());
        if let Err(e) = self.store.save(&task).await {
            // The child is already running; keep tracking it in memory.
            warn!(task_id = %id, "Failed to persist running state: {}", e);
        }
        info!(task_id = %id, pid = process.pid(), command = %task.command(), "Task started");

        self.tasks.write().await.insert(id.clone(), task);
        Ok((id, process))
    }

    async fn allocate_fresh(&self) -> TaskResult<(TaskId, CaptureFiles)> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let id = TaskId::new();
            match self.store.allocate(&id).await {
                Ok(files) => return Ok((id, files)),
                Err(TaskError::Storage { ref source, .. })
                    if source.kind() == std::io::ErrorKind::AlreadyExists
                        && attempt < MAX_ID_ATTEMPTS =>
                {
                    warn!(task_id = %id, "Task id collision, drawing a new one");
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn reap_in_background(&self, id: TaskId, process: RunningProcess) {
        self.reaping.lock().await.insert(id.clone());
        let manager = self.clone();
        process.detach(move |exit| async move {
            match exit {
                Ok(code) => manager.record_exit(&id, code).await,
                Err(e) => warn!(task_id = %id, "Lost track of process: {}", e),
            }
            // Removed only after the task is final, so a concurrent check
            // never finishes it with a guessed status.
            manager.reaping.lock().await.remove(&id);
        });
    }

    /// Called by the reaper once the child has exited.
    async fn record_exit(&self, id: &TaskId, code: Option<i32>) {
        let already_terminal = {
            let mut tasks = self.tasks.write().await;
            match tasks.get_mut(id) {
                Some(task) if task.status().is_terminal() => {
                    task.note_exit(code);
                    if let Err(e) = self.store.save(task).await {
                        warn!(task_id = %id, "Failed to persist exit code: {}", e);
                    }
                    true
                }
                Some(_) => false,
                None => return,
            }
        };
        if !already_terminal {
            if let Err(e) = self.finish(id, TaskStatus::from_exit_code(code), code).await {
                warn!(task_id = %id, "Failed to finish task: {}", e);
            }
        }
    }

    /// Move a task into `status`, reading and filtering its capture.
    ///
    /// No-op on a task that is already terminal; its cached report is
    /// returned instead.
    async fn finish(
        &self,
        id: &TaskId,
        status: TaskStatus,
        exit_code: Option<i32>,
    ) -> TaskResult<TaskReport> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?;
        if task.status().is_terminal() {
            return Ok(TaskReport::from(&*task));
        }

        let output = self.store.read_output(id).await?;
        let result = filter::extract_result(&output.stdout, &output.stderr);
        task.finish(status, exit_code, result);
        info!(
            task_id = %id,
            status = %task.status(),
            ?exit_code,
            elapsed_secs = task.elapsed_secs(),
            "Task finished"
        );

        if let Err(e) = self.store.save(task).await {
            warn!(task_id = %id, "Failed to persist final state: {}", e);
        }
        Ok(TaskReport::from(&*task))
    }

    async fn report(&self, id: &TaskId) -> TaskResult<TaskReport> {
        self.tasks
            .read()
            .await
            .get(id)
            .map(TaskReport::from)
            .ok_or_else(|| TaskError::NotFound(id.to_string()))
    }
}
