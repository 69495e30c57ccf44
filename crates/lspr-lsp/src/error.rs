//! Error types for the LSP transport and session layer

use crate::session::SessionState;
use lspr_foundation::LsprError;
use thiserror::Error;

/// Errors produced while decoding the Content-Length framed byte stream.
///
/// None of these are fatal: the offending bytes are dropped and decoding
/// continues with the next frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    #[error("Missing Content-Length header")]
    MissingContentLength,

    #[error("Invalid Content-Length header: {value}")]
    InvalidContentLength { value: String },

    #[error("Invalid JSON body: {message}")]
    InvalidJson { message: String },

    #[error("Failed to encode message: {message}")]
    Encode { message: String },
}

/// Errors surfaced by LSP sessions and the session registry
#[derive(Error, Debug)]
pub enum LspError {
    #[error("Unsupported language: {language}")]
    UnsupportedLanguage { language: String },

    #[error("Unsupported server variant: {variant}")]
    UnsupportedVariant { variant: String },

    #[error("{server} not found.\n\nTo install: {install_hint}\n\nPlease install the required language server and try again.")]
    ServerNotFound {
        server: String,
        install_hint: String,
    },

    #[error("Failed to start {server}: {message}")]
    SpawnFailed { server: String, message: String },

    #[error("{server} exited immediately after startup ({status})")]
    ServerExited { server: String, status: String },

    #[error("Failed to initialize {server}: {message}")]
    HandshakeFailed { server: String, message: String },

    /// Error object returned by the server; the message is shown verbatim.
    #[error("{message}")]
    Server { code: i64, message: String },

    #[error("LSP request '{method}' timed out after {timeout_ms}ms")]
    Timeout { method: String, timeout_ms: u64 },

    #[error("LSP server process exited")]
    ProcessExited,

    #[error("Failed to write to LSP server: {message}")]
    WriteFailed { message: String },

    #[error("LSP session is not ready (state: {state})")]
    NotReady { state: SessionState },

    #[error("LSP session channel closed")]
    ChannelClosed,

    #[error(transparent)]
    Framing(#[from] FramingError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type LspResult<T> = Result<T, LspError>;

impl From<LspError> for LsprError {
    fn from(err: LspError) -> Self {
        LsprError::lsp(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_not_found_message_names_install_hint() {
        let err = LspError::ServerNotFound {
            server: "Go Language Server (gopls)".to_string(),
            install_hint: "go install golang.org/x/tools/gopls@latest".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Go Language Server (gopls) not found.\n\nTo install: go install golang.org/x/tools/gopls@latest\n\nPlease install the required language server and try again."
        );
    }

    #[test]
    fn test_server_error_is_shown_verbatim() {
        let err: LsprError = LspError::Server {
            code: -32803,
            message: "Cannot rename this symbol".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "Cannot rename this symbol");
    }
}
