//! Tool handler registry
//!
//! Maps tool names to the handler that serves them.

use crate::tool_definitions::PUBLIC_TOOLS;
use crate::tools::{RefactorHandler, ReferencesHandler, RenameHandler, ToolContext, ToolHandler};
use lspr_foundation::model::mcp::{McpToolResult, ToolCall};
use lspr_foundation::{LsprError, LsprResult};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Registry for tool handlers providing routing by tool name
pub struct ToolRegistry {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
    /// Handler type name per tool, for diagnostics
    handler_names: HashMap<String, String>,
}

impl ToolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            handler_names: HashMap::new(),
        }
    }

    /// Registry with every public tool registered
    pub fn with_default_handlers() -> Self {
        let mut registry = Self::new();
        registry.register_with_name(Arc::new(RenameHandler), "RenameHandler");
        registry.register_with_name(Arc::new(RefactorHandler), "RefactorHandler");
        registry.register_with_name(Arc::new(ReferencesHandler), "ReferencesHandler");
        registry
    }

    /// Register every tool named by `handler.tool_names()`.
    /// A tool registered twice keeps the later handler.
    pub fn register_with_name(&mut self, handler: Arc<dyn ToolHandler>, handler_name: &str) {
        for tool_name in handler.tool_names() {
            debug!(
                tool_name = %tool_name,
                handler_name = %handler_name,
                "Registering tool handler"
            );

            if self
                .handlers
                .insert(tool_name.to_string(), handler.clone())
                .is_some()
            {
                warn!(
                    tool_name = %tool_name,
                    "Tool handler replaced (duplicate registration)"
                );
            }

            self.handler_names
                .insert(tool_name.to_string(), handler_name.to_string());
        }
    }

    /// Route a tool call to its handler
    pub async fn handle_tool(
        &self,
        tool_call: &ToolCall,
        context: &ToolContext,
    ) -> LsprResult<McpToolResult> {
        match self.handlers.get(&tool_call.name) {
            Some(handler) => handler.handle_tool_call(context, tool_call).await,
            None => Err(LsprError::not_supported(format!(
                "Unknown tool: '{}'. Available tools: {}",
                tool_call.name,
                PUBLIC_TOOLS.join(", ")
            ))),
        }
    }

    pub fn has_tool(&self, tool_name: &str) -> bool {
        self.handlers.contains_key(tool_name)
    }

    /// Registered tool names, sorted
    pub fn list_tools(&self) -> Vec<String> {
        let mut tools: Vec<String> = self.handlers.keys().cloned().collect();
        tools.sort();
        tools
    }

    /// (tool, handler type) pairs, sorted by tool name
    pub fn list_tools_with_handlers(&self) -> Vec<(String, String)> {
        let mut result: Vec<(String, String)> = self
            .handler_names
            .iter()
            .map(|(tool, handler)| (tool.clone(), handler.clone()))
            .collect();
        result.sort();
        result
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
