//! # codex-mcp
//!
//! MCP bridge that lets an agent drive the OpenAI Codex CLI.
//!
//! This library provides:
//! - Synchronous and background Codex runs, each tracked as a task on disk
//! - Liveness checks that survive a bridge restart (pid probe plus capture heartbeat)
//! - Output filtering that strips reasoning blocks and transcript noise
//!
//! ## Architecture
//!
//! ```text
//!   stdin ──▶ McpServer ──▶ Tool (codex_execute / _async / check_result)
//!                                   │
//!                                   ▼
//!                             TaskManager ──▶ runner (setsid child)
//!                                   │               │
//!                                   ▼               ▼
//!                              TaskStore  ◀── <id>.stdout / <id>.stderr
//!                             (<id>.meta)
//! ```
//!
//! ## Modules
//! - `task`: task model, on-disk store, process runner, output filter, manager
//! - `tools`: MCP tool adapters over the task manager
//! - `mcp`: JSON-RPC dispatch
//! - `config`: environment configuration

pub mod config;
pub mod mcp;
pub mod task;
pub mod tools;

pub use config::Config;
pub use task::{TaskManager, TaskReport, TaskStatus, TaskStore};
