//! JSON-RPC framing.
//!
//! `decode` turns raw bytes into a [`Call`]. Malformed frames become
//! [`DecodeError`]s that carry their own reply and never reach the bridge.

use serde::Serialize;
use serde_json::{Map, Value};

use super::messages::{McpError, McpResponse, RequestId, JSONRPC_VERSION};

/// A well-formed incoming frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Request {
        id: RequestId,
        method: String,
        params: Option<Value>,
    },
    Notification {
        method: String,
        params: Option<Value>,
    },
}

impl Call {
    pub fn request(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Call::Request {
            id,
            method: method.into(),
            params,
        }
    }

    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Call::Notification {
            method: method.into(),
            params,
        }
    }

    pub fn method(&self) -> &str {
        match self {
            Call::Request { method, .. } | Call::Notification { method, .. } => method,
        }
    }

    pub fn params(&self) -> Option<&Value> {
        match self {
            Call::Request { params, .. } | Call::Notification { params, .. } => params.as_ref(),
        }
    }

    pub fn id(&self) -> Option<&RequestId> {
        match self {
            Call::Request { id, .. } => Some(id),
            Call::Notification { .. } => None,
        }
    }

    pub fn is_notification(&self) -> bool {
        matches!(self, Call::Notification { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodeError {
    /// Request id, when it could be recovered from the frame.
    pub id: Option<RequestId>,
    pub error: McpError,
}

impl DecodeError {
    fn invalid(id: Option<RequestId>, message: impl Into<String>) -> Self {
        Self {
            id,
            error: McpError::InvalidRequest(message.into()),
        }
    }

    pub fn code(&self) -> i32 {
        self.error.code()
    }

    pub fn into_response(self) -> McpResponse {
        McpResponse::error(self.id, self.error)
    }
}

pub fn decode(raw: &[u8]) -> Result<Call, DecodeError> {
    let value: Value = serde_json::from_slice(raw).map_err(|e| DecodeError {
        id: None,
        error: McpError::ParseError(e.to_string()),
    })?;
    decode_value(value)
}

pub fn decode_value(value: Value) -> Result<Call, DecodeError> {
    let mut object = match value {
        Value::Object(object) => object,
        Value::Array(_) => return Err(DecodeError::invalid(None, "batches are not supported")),
        _ => return Err(DecodeError::invalid(None, "expected a JSON object")),
    };

    let id = take_id(&mut object)?;

    match object.get("jsonrpc").and_then(Value::as_str) {
        Some(JSONRPC_VERSION) => {}
        _ => return Err(DecodeError::invalid(id, "jsonrpc must be \"2.0\"")),
    }

    let method = match object.remove("method") {
        Some(Value::String(method)) if !method.is_empty() => method,
        _ => return Err(DecodeError::invalid(id, "method must be a non-empty string")),
    };

    let params = match object.remove("params") {
        None | Some(Value::Null) => None,
        Some(p @ (Value::Object(_) | Value::Array(_))) => Some(p),
        Some(_) => return Err(DecodeError::invalid(id, "params must be an object or array")),
    };

    Ok(match id {
        Some(id) => Call::Request { id, method, params },
        None => Call::Notification { method, params },
    })
}

fn take_id(object: &mut Map<String, Value>) -> Result<Option<RequestId>, DecodeError> {
    match object.remove("id") {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(RequestId::String(s))),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(|n| Some(RequestId::Number(n)))
            .ok_or_else(|| DecodeError::invalid(None, "id must be an integer or a string")),
        Some(_) => Err(DecodeError::invalid(None, "id must be an integer or a string")),
    }
}

/// Serialize an outgoing frame. Falls back to an internal error reply so a
/// frame is always produced.
pub fn encode<T: Serialize>(frame: &T) -> String {
    match serde_json::to_string(frame) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::error!("Failed to serialize outgoing frame: {}", e);
            let fallback = McpResponse::error(None, McpError::InternalError(e.to_string()));
            serde_json::to_string(&fallback).unwrap_or_default()
        }
    }
}
