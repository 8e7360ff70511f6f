//! Configuration management for codex-mcp.
//!
//! Configuration can be set via environment variables:
//! - `CODEX_CLI_PATH` - Optional. Codex binary to run. Defaults to `codex`.
//! - `CODEX_MCP_TASK_DIR` - Optional. Directory for task files. Defaults to `/tmp/codex_tasks`.
//! - `CODEX_MCP_IDLE_SECS` - Optional. Seconds a capture may stay idle before a
//!   task with a dead pid counts as finished. Defaults to `10`.
//! - `CODEX_MCP_RETENTION_HOURS` - Optional. Delete task files older than this at startup.
//! - `CODEX_MCP_LOG_FILE` - Optional. Append diagnostic logs to this file.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::task::{TaskManager, TaskStore, DEFAULT_IDLE_TIMEOUT};

pub const DEFAULT_TASK_DIR: &str = "/tmp/codex_tasks";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Bridge configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Codex CLI binary (name on PATH or absolute path)
    pub cli_path: String,

    /// Directory holding `<id>.stdout`, `<id>.stderr` and `<id>.meta`
    pub task_dir: PathBuf,

    /// Heartbeat window for the liveness check
    pub idle_timeout: Duration,

    /// Age after which task files are pruned at startup (disabled if `None`)
    pub retention: Option<Duration>,

    /// Diagnostic log file, in addition to stderr
    pub log_file: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a numeric variable does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let cli_path = non_empty_var("CODEX_CLI_PATH").unwrap_or_else(|| "codex".to_string());

        let task_dir = non_empty_var("CODEX_MCP_TASK_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TASK_DIR));

        let idle_timeout = match non_empty_var("CODEX_MCP_IDLE_SECS") {
            Some(raw) => Duration::from_secs(parse_u64("CODEX_MCP_IDLE_SECS", &raw)?),
            None => DEFAULT_IDLE_TIMEOUT,
        };

        let retention = non_empty_var("CODEX_MCP_RETENTION_HOURS")
            .map(|raw| parse_u64("CODEX_MCP_RETENTION_HOURS", &raw))
            .transpose()?
            .map(|hours| Duration::from_secs(hours.saturating_mul(3600)));

        let log_file = non_empty_var("CODEX_MCP_LOG_FILE").map(PathBuf::from);

        Ok(Self {
            cli_path,
            task_dir,
            idle_timeout,
            retention,
            log_file,
        })
    }

    /// Create a config with defaults rooted at `task_dir` (useful for testing).
    pub fn new(task_dir: PathBuf) -> Self {
        Self {
            cli_path: "codex".to_string(),
            task_dir,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            retention: None,
            log_file: None,
        }
    }

    /// Build the task manager this configuration describes.
    pub fn task_manager(&self) -> TaskManager {
        TaskManager::new(TaskStore::new(&self.task_dir), self.idle_timeout)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_u64(name: &str, raw: &str) -> Result<u64, ConfigError> {
    raw.parse()
        .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_defaults() {
        let config = Config::new(PathBuf::from("/tmp/x"));
        assert_eq!(config.cli_path, "codex");
        assert_eq!(config.idle_timeout, Duration::from_secs(10));
        assert!(config.retention.is_none());
        assert!(config.log_file.is_none());
    }

    #[test]
    fn test_parse_u64_error_names_variable() {
        let err = parse_u64("CODEX_MCP_IDLE_SECS", "soon").unwrap_err();
        assert!(err.to_string().contains("CODEX_MCP_IDLE_SECS"));
        assert_eq!(parse_u64("CODEX_MCP_IDLE_SECS", "15").unwrap(), 15);
    }
}
