//! MCP method routing for the refactoring server

use async_trait::async_trait;
use lspr_config::logging::tool_span;
use lspr_foundation::model::mcp::{
    McpError, McpMessage, McpRequest, McpResponse, McpToolResult, ToolCall, MCP_PROTOCOL_VERSION,
};
use lspr_foundation::LsprResult;
use lspr_handlers::{get_all_tool_definitions, ToolContext, ToolRegistry};
use lspr_lsp::SessionRegistry;
use lspr_transport::McpDispatcher;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

/// Name announced to MCP hosts during `initialize`
pub const SERVER_NAME: &str = "lsp-refactor-server";

/// Answers MCP requests: handshake, tool listing and tool calls
pub struct RefactorDispatcher {
    tools: ToolRegistry,
    context: ToolContext,
}

impl RefactorDispatcher {
    pub fn new(sessions: Arc<SessionRegistry>) -> Self {
        Self {
            tools: ToolRegistry::with_default_handlers(),
            context: ToolContext::new(sessions),
        }
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.context.sessions
    }

    async fn handle_request(&self, request: McpRequest) -> McpResponse {
        let McpRequest {
            id, method, params, ..
        } = request;
        debug!(method = %method, "Handling MCP request");

        match method.as_str() {
            "initialize" => McpResponse::success(id, initialize_result()),
            "ping" => McpResponse::success(id, json!({})),
            "tools/list" => McpResponse::success(id, json!({ "tools": get_all_tool_definitions() })),
            "tools/call" => {
                let call: ToolCall = match params.map(serde_json::from_value).transpose() {
                    Ok(Some(call)) => call,
                    Ok(None) => {
                        return McpResponse::failure(
                            id,
                            McpError::invalid_params("tools/call requires params"),
                        )
                    }
                    Err(e) => {
                        return McpResponse::failure(
                            id,
                            McpError::invalid_params(format!("Invalid tools/call params: {}", e)),
                        )
                    }
                };
                let result = self.call_tool(call).await;
                match serde_json::to_value(&result) {
                    Ok(value) => McpResponse::success(id, value),
                    Err(e) => McpResponse::failure(id, McpError::internal_error(e.to_string())),
                }
            }
            other => {
                warn!(method = %other, "Unknown MCP method");
                McpResponse::failure(id, McpError::method_not_found(other))
            }
        }
    }

    /// Run a tool. Failures are reported inside the result, flagged as errors.
    async fn call_tool(&self, call: ToolCall) -> McpToolResult {
        let request_id = Uuid::new_v4().to_string();
        let span = tool_span(&request_id, &call.name);

        async {
            info!("Tool call started");
            match self.tools.handle_tool(&call, &self.context).await {
                Ok(result) => {
                    info!("Tool call finished");
                    result
                }
                Err(e) => {
                    warn!(error = %e, "Tool call failed");
                    McpToolResult::error(format!("Error: {}", e))
                }
            }
        }
        .instrument(span)
        .await
    }
}

#[async_trait]
impl McpDispatcher for RefactorDispatcher {
    async fn dispatch(&self, message: McpMessage) -> LsprResult<Option<McpMessage>> {
        match message {
            McpMessage::Request(request) => Ok(Some(McpMessage::Response(
                self.handle_request(request).await,
            ))),
            McpMessage::Notification(notification) => {
                debug!(method = %notification.method, "Received MCP notification");
                Ok(None)
            }
            McpMessage::Response(response) => {
                debug!(id = %response.id, "Ignoring response from host");
                Ok(None)
            }
        }
    }
}

fn initialize_result() -> Value {
    json!({
        "protocolVersion": MCP_PROTOCOL_VERSION,
        "capabilities": { "tools": {} },
        "serverInfo": {
            "name": SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}
