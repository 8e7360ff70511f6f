//! Task module - detached Codex runs tracked through files on disk.
//!
//! Leaves first:
//! - `store`: capture files and status records, one flat directory
//! - `runner`: detached launch, liveness probe, wait
//! - `filter`: strips reasoning/trace lines from captured output
//! - `manager`: id assignment, state machine, sync and async entry points

mod command;
mod error;
pub mod filter;
mod manager;
pub mod runner;
mod store;
pub mod task;

pub use command::{CodexCommand, Invocation, Subcommand};
pub use error::{TaskError, TaskResult};
pub use manager::{TaskManager, TaskReport, DEFAULT_IDLE_TIMEOUT};
pub use store::{CaptureFiles, CapturedOutput, TaskStore};
pub use task::{Task, TaskId, TaskStatus};
