//! MCP server: JSON-RPC 2.0 dispatch over the Codex tools.
//!
//! The transport (newline-delimited JSON on stdin/stdout) lives in `main.rs`;
//! this module only maps one request to at most one response.

pub mod types;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::tools::{InvalidParams, Tool};
use types::{
    error_codes, JsonRpcRequest, JsonRpcResponse, ToolDefinition, ToolResult, PROTOCOL_VERSION,
    SERVER_NAME,
};

pub struct McpServer {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl McpServer {
    pub fn new(tools: HashMap<String, Arc<dyn Tool>>) -> Self {
        Self { tools }
    }

    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.parameters_schema(),
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Handle one request. Notifications get no response.
    pub async fn handle_request(&self, request: &JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!(method = %request.method, "MCP request");
        match request.method.as_str() {
            "initialize" => Some(JsonRpcResponse::success(
                request.id.clone(),
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "serverInfo": {
                        "name": SERVER_NAME,
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                    "capabilities": {
                        "tools": {
                            "listChanged": false
                        }
                    }
                }),
            )),
            "notifications/initialized" | "initialized" => None,
            "tools/list" => Some(JsonRpcResponse::success(
                request.id.clone(),
                json!({ "tools": self.tool_definitions() }),
            )),
            "tools/call" => Some(self.call_tool(request).await),
            method if method.starts_with("notifications/") => None,
            _ => Some(JsonRpcResponse::error(
                request.id.clone(),
                error_codes::METHOD_NOT_FOUND,
                format!("Method not found: {}", request.method),
            )),
        }
    }

    async fn call_tool(&self, request: &JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone();
        let name = request
            .params
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let args = request
            .params
            .get("arguments")
            .cloned()
            .unwrap_or(json!({}));

        let Some(tool) = self.tools.get(name) else {
            return JsonRpcResponse::error(
                id,
                error_codes::METHOD_NOT_FOUND,
                format!("Unknown tool: {}", name),
            );
        };

        let result = match tool.execute(args).await {
            Ok(text) => ToolResult::text(text),
            Err(e) => {
                if let Some(invalid) = e.downcast_ref::<InvalidParams>() {
                    return JsonRpcResponse::error(
                        id,
                        error_codes::INVALID_PARAMS,
                        invalid.to_string(),
                    );
                }
                warn!(tool = name, "Tool call failed: {}", e);
                ToolResult::error(format!("Error: {}", e))
            }
        };
        JsonRpcResponse::success(id, json!(result))
    }
}

/// Response for a line that is not valid JSON-RPC.
pub fn parse_error(err: &serde_json::Error) -> JsonRpcResponse {
    JsonRpcResponse::error(
        Value::Null,
        error_codes::PARSE_ERROR,
        format!("Parse error: {}", err),
    )
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::task::{TaskManager, TaskStore};
    use crate::tools::tool_set;
    use std::time::Duration;

    fn server(dir: &std::path::Path, cli: &str) -> McpServer {
        let manager = TaskManager::new(TaskStore::new(dir), Duration::from_millis(300));
        McpServer::new(tool_set(manager, cli))
    }

    fn request(raw: Value) -> JsonRpcRequest {
        serde_json::from_value(raw).expect("valid request")
    }

    #[tokio::test]
    async fn test_initialize() {
        let temp = tempfile::tempdir().expect("tempdir");
        let server = server(temp.path(), "echo");

        let response = server
            .handle_request(&request(json!({
                "jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}
            })))
            .await
            .expect("response");
        let result = response.result.expect("result");
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], SERVER_NAME);
    }

    #[tokio::test]
    async fn test_notifications_get_no_response() {
        let temp = tempfile::tempdir().expect("tempdir");
        let server = server(temp.path(), "echo");

        for method in ["notifications/initialized", "initialized", "notifications/cancelled"] {
            let response = server
                .handle_request(&request(json!({ "jsonrpc": "2.0", "method": method })))
                .await;
            assert!(response.is_none(), "{}", method);
        }
    }

    #[tokio::test]
    async fn test_tools_list_is_sorted() {
        let temp = tempfile::tempdir().expect("tempdir");
        let server = server(temp.path(), "echo");

        let response = server
            .handle_request(&request(json!({
                "jsonrpc": "2.0", "id": 2, "method": "tools/list"
            })))
            .await
            .expect("response");
        let tools = response.result.expect("result")["tools"].clone();
        let names: Vec<&str> = tools
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(
            names,
            vec!["codex_check_result", "codex_execute", "codex_execute_async"]
        );
        assert!(tools[0]["inputSchema"].is_object());
    }

    #[tokio::test]
    async fn test_tools_call_returns_text_content() {
        let temp = tempfile::tempdir().expect("tempdir");
        let server = server(temp.path(), "echo");

        let response = server
            .handle_request(&request(json!({
                "jsonrpc": "2.0", "id": "a", "method": "tools/call",
                "params": { "name": "codex_execute", "arguments": { "prompt": "hi" } }
            })))
            .await
            .expect("response");
        assert_eq!(response.id, json!("a"));
        let result = response.result.expect("result");
        assert_eq!(result["isError"], false);
        assert_eq!(result["content"][0]["type"], "text");
        assert_eq!(result["content"][0]["text"], "exec hi");
    }

    #[tokio::test]
    async fn test_missing_task_id_is_invalid_params() {
        let temp = tempfile::tempdir().expect("tempdir");
        let server = server(temp.path(), "echo");

        let response = server
            .handle_request(&request(json!({
                "jsonrpc": "2.0", "id": 3, "method": "tools/call",
                "params": { "name": "codex_check_result", "arguments": {} }
            })))
            .await
            .expect("response");
        let error = response.error.expect("error");
        assert_eq!(error.code, error_codes::INVALID_PARAMS);
        assert_eq!(error.message, "task_id is required");
    }

    #[tokio::test]
    async fn test_unknown_task_is_tool_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let server = server(temp.path(), "echo");

        let response = server
            .handle_request(&request(json!({
                "jsonrpc": "2.0", "id": 4, "method": "tools/call",
                "params": { "name": "codex_check_result", "arguments": { "task_id": "nope" } }
            })))
            .await
            .expect("response");
        let result = response.result.expect("result");
        assert_eq!(result["isError"], true);
        assert_eq!(result["content"][0]["text"], "Error: Task nope not found");
    }

    #[tokio::test]
    async fn test_unknown_tool_and_method() {
        let temp = tempfile::tempdir().expect("tempdir");
        let server = server(temp.path(), "echo");

        let response = server
            .handle_request(&request(json!({
                "jsonrpc": "2.0", "id": 5, "method": "tools/call",
                "params": { "name": "rm_rf" }
            })))
            .await
            .expect("response");
        assert_eq!(response.error.unwrap().code, error_codes::METHOD_NOT_FOUND);

        let response = server
            .handle_request(&request(json!({
                "jsonrpc": "2.0", "id": 6, "method": "resources/list"
            })))
            .await
            .expect("response");
        let error = response.error.unwrap();
        assert_eq!(error.code, error_codes::METHOD_NOT_FOUND);
        assert_eq!(error.message, "Method not found: resources/list");
    }

    #[test]
    fn test_parse_error_response() {
        let err = serde_json::from_str::<JsonRpcRequest>("{oops").unwrap_err();
        let response = parse_error(&err);
        let encoded = serde_json::to_value(&response).unwrap();
        assert_eq!(encoded["id"], Value::Null);
        assert_eq!(encoded["error"]["code"], error_codes::PARSE_ERROR);
        assert!(encoded.get("result").is_none());
    }
}
