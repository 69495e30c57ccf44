//! Stdio transport implementation for MCP
//!
//! Messages are newline-delimited JSON. Each inbound message is dispatched on
//! its own task, so a slow tool call does not hold up `ping` or `tools/list`;
//! a single writer task serializes everything written back.

use crate::McpDispatcher;
use lspr_foundation::model::mcp::{McpError, McpMessage, McpResponse};
use lspr_foundation::{LsprError, LsprResult};
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

/// Reads newline-delimited messages
pub struct MessageReader<R> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
        }
    }

    /// Next non-empty line, or `None` at EOF
    pub async fn read_message(&mut self) -> std::io::Result<Option<String>> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line).await? == 0 {
                return Ok(None);
            }
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                return Ok(Some(trimmed.to_string()));
            }
        }
    }
}

/// Serve MCP on the process's stdin and stdout until stdin closes
pub async fn start_stdio_server(dispatcher: Arc<dyn McpDispatcher>) -> LsprResult<()> {
    info!("Starting stdio MCP server");
    serve(dispatcher, tokio::io::stdin(), tokio::io::stdout()).await
}

/// Serve MCP over any reader/writer pair until the reader reaches EOF.
///
/// Returns after every dispatched message has been answered.
pub async fn serve<R, W>(dispatcher: Arc<dyn McpDispatcher>, reader: R, writer: W) -> LsprResult<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut messages = MessageReader::new(reader);
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();

    let writer_task = tokio::spawn(async move {
        let mut writer = writer;
        while let Some(message) = outbound_rx.recv().await {
            if let Err(e) = write_line(&mut writer, &message).await {
                error!(error = %e, "Failed to write to stdout");
                break;
            }
        }
    });

    let mut in_flight = JoinSet::new();
    loop {
        let line = match messages.read_message().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("EOF reached, shutting down stdio server");
                break;
            }
            Err(e) => {
                error!(error = %e, "Error reading from stdin");
                break;
            }
        };

        let request_id = Uuid::new_v4().to_string();
        let span = lspr_config::logging::request_span(&request_id, "stdio");
        debug!(parent: &span, message_length = line.len(), "Received message");

        let message = match parse_message(&line) {
            Ok(message) => message,
            Err(response) => {
                warn!(parent: &span, "Rejected malformed message");
                send(&outbound_tx, &response);
                continue;
            }
        };

        let dispatcher = dispatcher.clone();
        let outbound = outbound_tx.clone();
        in_flight.spawn(
            async move {
                if let Some(response) = handle(dispatcher.as_ref(), message).await {
                    send(&outbound, &response);
                }
            }
            .instrument(span),
        );

        // Reap finished tasks so the set does not grow without bound.
        while in_flight.try_join_next().is_some() {}
    }

    while in_flight.join_next().await.is_some() {}
    drop(outbound_tx);
    if let Err(e) = writer_task.await {
        error!(error = %e, "Stdout writer task failed");
    }

    info!("Stdio server stopped");
    Ok(())
}

/// Decode one line. Failures come back as the error response to send.
fn parse_message(line: &str) -> Result<McpMessage, McpMessage> {
    let value: Value = serde_json::from_str(line).map_err(|e| {
        error_response(Value::Null, McpError::parse_error(format!("Parse error: {}", e)))
    })?;

    let id = value.get("id").cloned().unwrap_or(Value::Null);
    serde_json::from_value(value).map_err(|e| {
        error_response(
            id,
            McpError {
                code: McpError::INVALID_REQUEST,
                message: format!("Invalid request: {}", e),
                data: None,
            },
        )
    })
}

/// Dispatch one message, turning dispatcher failures on requests into
/// JSON-RPC internal errors
async fn handle(dispatcher: &dyn McpDispatcher, message: McpMessage) -> Option<McpMessage> {
    let request_id = match &message {
        McpMessage::Request(request) => Some(request.id.clone()),
        _ => None,
    };

    match dispatcher.dispatch(message).await {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, "Failed to handle message");
            request_id.map(|id| error_response(id, McpError::internal_error(e.to_string())))
        }
    }
}

fn error_response(id: Value, error: McpError) -> McpMessage {
    McpMessage::Response(McpResponse::failure(id, error))
}

fn send(outbound: &mpsc::UnboundedSender<String>, message: &McpMessage) {
    match serde_json::to_string(message) {
        Ok(json) => {
            let _ = outbound.send(json);
        }
        Err(e) => error!(error = %LsprError::from(e), "Failed to serialize response"),
    }
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, message: &str) -> std::io::Result<()> {
    writer.write_all(message.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
