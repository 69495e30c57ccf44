//! Error handling shared by the lspr crates

use std::path::PathBuf;
use thiserror::Error;

/// Error type used across tool handlers, the transport and the server binary
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum LsprError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid request: {message}")]
    InvalidRequest {
        message: String,
        parameter: Option<String>,
    },

    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Operation not supported: {operation}")]
    NotSupported { operation: String },

    /// Failure reported by the LSP layer; the message is already user-facing.
    #[error("{message}")]
    Lsp { message: String },

    #[error("I/O error: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("{message}")]
    Runtime { message: String },
}

impl LsprError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid request error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
            parameter: None,
        }
    }

    /// Create an invalid request error pointing at a specific parameter
    pub fn invalid_parameter(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
            parameter: Some(parameter.into()),
        }
    }

    /// Create a not found error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create a not supported error
    pub fn not_supported(operation: impl Into<String>) -> Self {
        Self::NotSupported {
            operation: operation.into(),
        }
    }

    /// Create an LSP error
    pub fn lsp(message: impl Into<String>) -> Self {
        Self::Lsp {
            message: message.into(),
        }
    }

    /// Create a runtime error
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
        }
    }

    /// Wrap an I/O error together with the path it concerns
    pub fn io_at(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        Self::Io {
            message: format!("{}: {}", path.display(), source),
            path: Some(path),
            source: Some(source),
        }
    }

    /// Prefix the error message with context, keeping the variant
    pub fn context(self, prefix: &str) -> Self {
        match self {
            Self::Lsp { message } => Self::Lsp {
                message: format!("{}: {}", prefix, message),
            },
            Self::Runtime { message } => Self::Runtime {
                message: format!("{}: {}", prefix, message),
            },
            other => Self::Runtime {
                message: format!("{}: {}", prefix, other),
            },
        }
    }
}

impl From<std::io::Error> for LsprError {
    fn from(err: std::io::Error) -> Self {
        LsprError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for LsprError {
    fn from(err: serde_json::Error) -> Self {
        LsprError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

/// Result alias used throughout lspr
pub type LsprResult<T> = Result<T, LsprError>;
