//! Tool system for the MCP server.
//!
//! Each tool is a thin adapter: it validates JSON arguments, calls into the
//! shared [`TaskManager`](crate::task::TaskManager), and renders the report as
//! text for the calling agent.

mod codex;

pub use codex::{CodexCheckResult, CodexExecute, CodexExecuteAsync};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::task::TaskManager;

/// Trait for implementing tools.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool.
    fn name(&self) -> &str;

    /// A description of what this tool does.
    fn description(&self) -> &str;

    /// JSON schema for the tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute the tool with the given arguments.
    ///
    /// Return an [`InvalidParams`] error for malformed arguments; any other
    /// error is reported to the caller as a failed tool call.
    async fn execute(&self, args: Value) -> anyhow::Result<String>;
}

/// Arguments did not match the tool's schema.
///
/// Surfaced as a JSON-RPC `-32602` error rather than a tool result.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct InvalidParams(pub String);

/// All Codex tools, keyed by name, sharing one task manager.
pub fn tool_set(manager: TaskManager, cli_path: &str) -> HashMap<String, Arc<dyn Tool>> {
    let tools: [Arc<dyn Tool>; 3] = [
        Arc::new(CodexExecute::new(manager.clone(), cli_path)),
        Arc::new(CodexExecuteAsync::new(manager.clone(), cli_path)),
        Arc::new(CodexCheckResult::new(manager)),
    ];
    tools
        .into_iter()
        .map(|tool| (tool.name().to_string(), tool))
        .collect()
}
