//! Codex tools: synchronous run, background start, result check.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{InvalidParams, Tool};
use crate::task::{CodexCommand, Subcommand, TaskManager, TaskReport, TaskStatus};

const NO_OUTPUT: &str = "No output from Codex";

const ARGS_DESCRIPTION: &str = "Additional command-line arguments. Model selection: \
    [\"-m\", \"gpt-5-codex\"] for coding or [\"-m\", \"gpt-5\"] for analysis. Reasoning effort: \
    [\"--config\", \"model_reasoning_effort=low|medium|high\"]. Include \"--full-auto\" for \
    non-interactive execution.";

fn subcommand_schema() -> Value {
    json!({
        "type": "string",
        "description": "Codex subcommand to execute",
        "enum": Subcommand::ALL.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
        "default": Subcommand::default().as_str()
    })
}

fn command_properties() -> serde_json::Map<String, Value> {
    let mut properties = serde_json::Map::new();
    properties.insert("subcommand".to_string(), subcommand_schema());
    properties.insert(
        "prompt".to_string(),
        json!({
            "type": "string",
            "description": "Main prompt/argument for the command (required for exec, optional for others)"
        }),
    );
    properties.insert(
        "args".to_string(),
        json!({
            "type": "array",
            "items": { "type": "string" },
            "description": ARGS_DESCRIPTION
        }),
    );
    properties
}

fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> anyhow::Result<T> {
    // Clients send `null` or omit arguments entirely for all-default calls.
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args)
        .map_err(|e| InvalidParams(format!("Invalid arguments for {}: {}", tool, e)).into())
}

fn result_text(report: &TaskReport) -> &str {
    match report.result.as_deref() {
        Some(text) if !text.is_empty() => text,
        _ => NO_OUTPUT,
    }
}

/// Human-readable rendering of a task report.
pub(crate) fn render_report(report: &TaskReport) -> String {
    let id = &report.task_id;
    match report.status {
        TaskStatus::Pending | TaskStatus::Running => format!(
            "Task {} is still running.\nElapsed: {}s\nCommand: {}",
            id, report.elapsed_secs, report.command
        ),
        TaskStatus::Completed => format!(
            "Task {} completed in {}s.\n\nResult:\n{}",
            id,
            report.elapsed_secs,
            result_text(report)
        ),
        TaskStatus::Failed => {
            let cause = match report.exit_code {
                Some(code) => format!("exit code {}", code),
                None => "no exit code".to_string(),
            };
            format!(
                "Task {} failed ({}) after {}s.\n\nOutput:\n{}",
                id,
                cause,
                report.elapsed_secs,
                result_text(report)
            )
        }
        TaskStatus::TimedOut => format!(
            "Task {} timed out after {}s. Codex keeps running in the background.\n\nPartial output:\n{}",
            id,
            report.elapsed_secs,
            result_text(report)
        ),
    }
}

#[derive(Debug, Deserialize)]
struct ExecuteArgs {
    #[serde(flatten)]
    command: CodexCommand,
    /// Seconds; 0 or absent means no limit
    #[serde(default)]
    timeout: Option<u64>,
}

/// Run Codex and block until it exits (or the timeout elapses).
pub struct CodexExecute {
    manager: TaskManager,
    cli_path: String,
}

impl CodexExecute {
    pub fn new(manager: TaskManager, cli_path: impl Into<String>) -> Self {
        Self {
            manager,
            cli_path: cli_path.into(),
        }
    }
}

#[async_trait]
impl Tool for CodexExecute {
    fn name(&self) -> &str {
        "codex_execute"
    }

    fn description(&self) -> &str {
        "Execute OpenAI Codex synchronously with full control over subcommand and arguments. \
         Returns only the final answer, filtering out the thinking process and command logs to \
         save context. Common usage: subcommand=\"exec\", prompt=\"your task\", args=[\"--full-auto\"]"
    }

    fn parameters_schema(&self) -> Value {
        let mut properties = command_properties();
        properties.insert(
            "timeout".to_string(),
            json!({
                "type": "integer",
                "description": "Timeout in seconds (default: no limit). Codex is not stopped when it elapses."
            }),
        );
        json!({
            "type": "object",
            "properties": properties,
            "required": []
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<String> {
        let args: ExecuteArgs = parse_args(self.name(), args)?;
        let timeout = args
            .timeout
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        let invocation = args.command.invocation(&self.cli_path);

        let report = self.manager.execute_sync(&invocation, timeout).await?;
        Ok(match report.status {
            TaskStatus::Completed => result_text(&report).to_string(),
            _ => render_report(&report),
        })
    }
}

/// Start Codex in the background and return its task id.
pub struct CodexExecuteAsync {
    manager: TaskManager,
    cli_path: String,
}

impl CodexExecuteAsync {
    pub fn new(manager: TaskManager, cli_path: impl Into<String>) -> Self {
        Self {
            manager,
            cli_path: cli_path.into(),
        }
    }
}

#[async_trait]
impl Tool for CodexExecuteAsync {
    fn name(&self) -> &str {
        "codex_execute_async"
    }

    fn description(&self) -> &str {
        "Start a Codex task in the background and return immediately with a task_id. \
         Use codex_check_result to retrieve the result later. This allows you to continue \
         working while Codex runs."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": command_properties(),
            "required": []
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<String> {
        let command: CodexCommand = parse_args(self.name(), args)?;
        let invocation = command.invocation(&self.cli_path);

        let report = self.manager.execute_async(&invocation).await?;
        Ok(format!(
            "Codex task started in background.\nTask ID: {id}\n\n\
             Use codex_check_result(task_id=\"{id}\") to retrieve the result.",
            id = report.task_id
        ))
    }
}

#[derive(Debug, Deserialize)]
struct CheckArgs {
    task_id: Option<String>,
}

/// Poll a background task.
pub struct CodexCheckResult {
    manager: TaskManager,
}

impl CodexCheckResult {
    pub fn new(manager: TaskManager) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl Tool for CodexCheckResult {
    fn name(&self) -> &str {
        "codex_check_result"
    }

    fn description(&self) -> &str {
        "Check the status of an async Codex task. Returns running/completed status and the \
         result if available."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task_id": {
                    "type": "string",
                    "description": "The task_id returned by codex_execute_async"
                }
            },
            "required": ["task_id"]
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<String> {
        let args: CheckArgs = parse_args(self.name(), args)?;
        let task_id = args
            .task_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| InvalidParams("task_id is required".to_string()))?;

        let report = self.manager.check_result(&task_id).await?;
        Ok(render_report(&report))
    }
}
