//! JSON-RPC 2.0 envelopes exchanged with language servers

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC code for requests the client does not handle
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Outbound request; the id is allocated by the correlator
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: i64,
    pub method: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn new(id: i64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method: method.into(),
            params,
        }
    }
}

/// Outbound notification
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct JsonRpcNotification {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method: method.into(),
            params,
        }
    }
}

/// Answer to a request initiated by the server
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct JsonRpcReply {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

impl JsonRpcReply {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: ResponseError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// Error object carried by a failed response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseError {
    #[serde(default)]
    pub code: i64,
    #[serde(default = "unknown_error")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

fn unknown_error() -> String {
    "Unknown error".to_string()
}

impl ResponseError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method not found: {}", method))
    }

    /// Read whatever a server put in `error`. Anything that is not a
    /// well-formed error object still yields a failure carrying its text.
    pub fn from_value(error: Value) -> Self {
        match error {
            Value::Object(_) => match serde_json::from_value::<Self>(error.clone()) {
                Ok(parsed) => parsed,
                Err(_) => {
                    let message = match error.get("message") {
                        Some(Value::String(text)) => text.clone(),
                        _ => error.to_string(),
                    };
                    let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
                    Self::new(code, message)
                }
            },
            Value::String(text) => Self::new(0, text),
            other => Self::new(0, other.to_string()),
        }
    }
}

/// Outcome of a request, decided by the presence of `error`
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseOutcome {
    Success(Value),
    Failure(ResponseError),
}

impl ResponseOutcome {
    pub fn into_result(self) -> Result<Value, ResponseError> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure(error) => Err(error),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MessageError {
    #[error("Message has neither a method nor an id")]
    Unrecognized,
}

/// A decoded message received from a server
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingMessage {
    Request {
        id: Value,
        method: String,
        params: Value,
    },
    Notification {
        method: String,
        params: Value,
    },
    Response {
        id: Value,
        outcome: ResponseOutcome,
    },
}

impl IncomingMessage {
    /// Classify a raw JSON value.
    ///
    /// A response carrying neither `result` nor `error` is a success with a
    /// `null` result.
    pub fn classify(mut value: Value) -> Result<Self, MessageError> {
        let method = value
            .get("method")
            .and_then(Value::as_str)
            .map(str::to_string);
        let id = value.get_mut("id").map(Value::take).filter(|id| !id.is_null());
        let params = value.get_mut("params").map(Value::take).unwrap_or(Value::Null);

        match (method, id) {
            (Some(method), Some(id)) => Ok(Self::Request { id, method, params }),
            (Some(method), None) => Ok(Self::Notification { method, params }),
            (None, Some(id)) => {
                let outcome = match value.get_mut("error").map(Value::take) {
                    Some(error) if !error.is_null() => {
                        ResponseOutcome::Failure(ResponseError::from_value(error))
                    }
                    _ => ResponseOutcome::Success(
                        value.get_mut("result").map(Value::take).unwrap_or(Value::Null),
                    ),
                };
                Ok(Self::Response { id, outcome })
            }
            (None, None) => Err(MessageError::Unrecognized),
        }
    }
}
