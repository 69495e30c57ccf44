//! Transport between the MCP host and the lspr server
//!
//! MCP over stdio: one JSON-RPC message per line on stdin, answers on stdout.

use async_trait::async_trait;
use lspr_foundation::model::mcp::McpMessage;
use lspr_foundation::LsprResult;

pub mod stdio;

pub use stdio::{serve, start_stdio_server, MessageReader};

/// Handles inbound MCP messages for a transport
#[async_trait]
pub trait McpDispatcher: Send + Sync {
    /// Handle one message. Requests yield a response; notifications yield
    /// `None`.
    async fn dispatch(&self, message: McpMessage) -> LsprResult<Option<McpMessage>>;
}
