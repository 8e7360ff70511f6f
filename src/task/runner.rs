//! Detached process launcher and liveness probe.
//!
//! Children are started in their own session (`setsid`) so that signals sent
//! to the host's process group (Ctrl-C, the MCP client killing the server)
//! never reach them. Output goes straight into the task's capture files;
//! the host keeps no pipes open.

use std::future::Future;
use std::process::Stdio;

use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::error::{TaskError, TaskResult};
use super::store::CaptureFiles;

/// A launched child the host may wait on or hand off to a background reaper.
#[derive(Debug)]
pub struct RunningProcess {
    pid: u32,
    child: Child,
}

impl RunningProcess {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Block until the child exits.
    ///
    /// Returns the exit code, or `None` when it was killed by a signal.
    pub async fn wait(&mut self) -> std::io::Result<Option<i32>> {
        let status = self.child.wait().await?;
        Ok(status.code())
    }

    /// Reap the child in the background and report how the wait ended.
    ///
    /// The child keeps running if the host runtime shuts down first; it only
    /// loses its reporter.
    pub fn detach<F, Fut>(mut self, on_exit: F) -> JoinHandle<()>
    where
        F: FnOnce(std::io::Result<Option<i32>>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(async move {
            let exit = self.wait().await;
            match &exit {
                Ok(code) => debug!(pid = self.pid, ?code, "Detached process exited"),
                Err(e) => warn!(pid = self.pid, "Failed to wait for detached process: {}", e),
            }
            on_exit(exit).await;
        })
    }
}

/// Launch `program args...` with stdout/stderr redirected into `files`.
///
/// stdin is closed; the prompt is always passed as an argument.
pub fn start(program: &str, args: &[String], files: CaptureFiles) -> TaskResult<RunningProcess> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(files.stdout))
        .stderr(Stdio::from(files.stderr))
        .kill_on_drop(false);

    #[cfg(unix)]
    unsafe {
        // Only async-signal-safe calls are allowed between fork and exec.
        cmd.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let child = cmd.spawn().map_err(|source| TaskError::Launch {
        program: program.to_string(),
        source,
    })?;

    let pid = child.id().ok_or_else(|| TaskError::Launch {
        program: program.to_string(),
        source: std::io::Error::other("process exited before its pid could be read"),
    })?;

    debug!(pid, program, "Spawned detached process");
    Ok(RunningProcess { pid, child })
}

/// Best-effort liveness probe.
///
/// `kill(pid, 0)` succeeding (or failing with `EPERM`) means a process with
/// that pid exists. On Linux a zombie is reported as dead.
#[cfg(unix)]
pub fn is_alive(pid: u32) -> bool {
    let Ok(raw) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }
    let rc = unsafe { libc::kill(raw, 0) };
    let exists =
        rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM);
    exists && !is_zombie(pid)
}

#[cfg(not(unix))]
pub fn is_alive(_pid: u32) -> bool {
    false
}

#[cfg(target_os = "linux")]
fn is_zombie(pid: u32) -> bool {
    // Format: "pid (comm) S ..."; comm may contain spaces and parens.
    std::fs::read_to_string(format!("/proc/{}/stat", pid))
        .ok()
        .and_then(|stat| {
            let rest = &stat[stat.rfind(')')? + 1..];
            rest.split_whitespace().next().map(|state| state == "Z")
        })
        .unwrap_or(false)
}

#[cfg(all(unix, not(target_os = "linux")))]
fn is_zombie(_pid: u32) -> bool {
    false
}
