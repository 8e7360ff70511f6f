//! codex-mcp - MCP stdio server entry point
//!
//! Reads newline-delimited JSON-RPC requests from stdin and writes responses
//! to stdout. Logs go to stderr (and optionally a file) so they never mix
//! with protocol traffic.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::sync::Mutex;

use codex_mcp::config::Config;
use codex_mcp::mcp::types::JsonRpcRequest;
use codex_mcp::mcp::{parse_error, McpServer};
use codex_mcp::tools::tool_set;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_logging(&config)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    info!(
        "Starting codex-mcp: cli={} task_dir={} idle={}s",
        config.cli_path,
        config.task_dir.display(),
        config.idle_timeout.as_secs()
    );

    let manager = config.task_manager();
    if let Some(max_age) = config.retention {
        match runtime.block_on(manager.store().prune_older_than(max_age)) {
            Ok(0) => {}
            Ok(n) => info!("Pruned {} expired task(s)", n),
            Err(e) => warn!("Task cleanup failed: {}", e),
        }
    }

    let server = McpServer::new(tool_set(manager, &config.cli_path));

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    let reader = BufReader::new(stdin.lock());

    for line in reader.lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to read stdin: {}", e);
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<JsonRpcRequest>(&line) {
            Ok(request) => runtime.block_on(server.handle_request(&request)),
            Err(e) => {
                warn!("Malformed request: {}", e);
                Some(parse_error(&e))
            }
        };

        if let Some(response) = response {
            let encoded = serde_json::to_string(&response)?;
            writeln!(stdout, "{}", encoded)?;
            stdout.flush()?;
        }
    }

    info!("stdin closed, shutting down");
    Ok(())
}

fn init_logging(config: &Config) -> anyhow::Result<()> {
    let file_layer = match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "codex_mcp=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(())
}
