//! MCP protocol dispatcher.
//!
//! Stateless: every request is routed on its own and produces exactly one
//! response echoing the request id. The `initialize` handshake is advisory
//! and does not gate later calls.

use std::sync::Arc;

use serde_json::json;

use crate::error::codes;
use crate::orchestrator::{ActionOrchestrator, ProgressSink};
use crate::protocol::{
    InitializeParams, InitializeResult, JsonRpcId, JsonRpcRequest, JsonRpcResponse,
    ListToolsResult, ServerCapabilities, ServerInfo, ToolCallParams, ToolsCapability,
};

/// MCP protocol version.
pub const PROTOCOL_VERSION: &str = "2025-03-26";

/// Server name.
pub const SERVER_NAME: &str = "xiaohongshu-mcp";

/// Server version.
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// MCP server for Xiaohongshu automation.
#[derive(Clone)]
pub struct McpServer {
    orchestrator: Arc<ActionOrchestrator>,
}

impl McpServer {
    /// Create a dispatcher over `orchestrator`.
    pub fn new(orchestrator: Arc<ActionOrchestrator>) -> Self {
        Self { orchestrator }
    }

    /// The orchestrator tool calls are delegated to.
    pub fn orchestrator(&self) -> &Arc<ActionOrchestrator> {
        &self.orchestrator
    }

    /// Handle a JSON-RPC request.
    pub async fn handle_request(
        &self,
        request: JsonRpcRequest,
        progress: Option<&ProgressSink>,
    ) -> JsonRpcResponse {
        let id = request.id;
        tracing::info!(method = %request.method, "received request");

        match request.method.as_str() {
            "initialize" => self.handle_initialize(id, request.params),
            "initialized" | "notifications/initialized" => {
                tracing::info!("Client initialized");
                JsonRpcResponse::success(id, json!({}))
            }
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => self.handle_tools_list(id),
            "tools/call" => self.handle_tools_call(id, request.params, progress).await,
            _ => JsonRpcResponse::error(
                id,
                codes::METHOD_NOT_FOUND,
                format!("method not found: {}", request.method),
            ),
        }
    }

    /// Handle initialize request.
    fn handle_initialize(&self, id: JsonRpcId, params: Option<serde_json::Value>) -> JsonRpcResponse {
        let params: InitializeParams = params
            .and_then(|p| serde_json::from_value(p).ok())
            .unwrap_or_default();
        tracing::info!(
            client = params.client_info.as_ref().map(|c| c.name.as_str()).unwrap_or("unknown"),
            requested_version = params.protocol_version.as_deref().unwrap_or("unspecified"),
            "initialize"
        );

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.into(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: false,
                }),
            },
            server_info: ServerInfo {
                name: SERVER_NAME.into(),
                version: SERVER_VERSION.into(),
            },
        };

        JsonRpcResponse::success(id, result)
    }

    /// Handle tools/list request.
    fn handle_tools_list(&self, id: JsonRpcId) -> JsonRpcResponse {
        let tools = self.orchestrator.registry().list_tools();
        JsonRpcResponse::success(id, ListToolsResult { tools })
    }

    /// Handle tools/call request.
    async fn handle_tools_call(
        &self,
        id: JsonRpcId,
        params: Option<serde_json::Value>,
        progress: Option<&ProgressSink>,
    ) -> JsonRpcResponse {
        let params = match ToolCallParams::from_params(params) {
            Ok(params) => params,
            Err(e) => return JsonRpcResponse::error(id, codes::INVALID_PARAMS, e.to_string()),
        };

        let tool = params.name.clone();
        match self.orchestrator.call_tool(params, progress).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(e) => {
                tracing::error!("Tool {} failed: {}", tool, e);
                JsonRpcResponse::error(id, codes::INTERNAL_ERROR, e.to_string())
            }
        }
    }
}
