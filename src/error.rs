//! Error taxonomy shared by every layer of the bridge.
//!
//! Every failure that crosses a component boundary is a [`BridgeError`], and
//! every [`BridgeError`] belongs to exactly one [`ErrorKind`]. The kind names
//! are part of the wire contract (`errorKind` in tool results).

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// Closed set of error kinds surfaced to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "ValidationError")]
    Validation,
    #[serde(rename = "NotFoundError")]
    NotFound,
    #[serde(rename = "BackendError")]
    Backend,
    #[serde(rename = "TimeoutError")]
    Timeout,
    #[serde(rename = "ProtocolError")]
    Protocol,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "ValidationError",
            ErrorKind::NotFound => "NotFoundError",
            ErrorKind::Backend => "BackendError",
            ErrorKind::Timeout => "TimeoutError",
            ErrorKind::Protocol => "ProtocolError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sub-classification of remote failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackendErrorCode {
    AuthFailed,
    AccessDenied,
    RateLimited,
    ServerError,
    NetworkError,
}

impl BackendErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendErrorCode::AuthFailed => "AUTH_FAILED",
            BackendErrorCode::AccessDenied => "ACCESS_DENIED",
            BackendErrorCode::RateLimited => "RATE_LIMITED",
            BackendErrorCode::ServerError => "SERVER_ERROR",
            BackendErrorCode::NetworkError => "NETWORK_ERROR",
        }
    }
}

impl fmt::Display for BackendErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BridgeError {
    #[error("{message}")]
    Validation {
        message: String,
        status: Option<u16>,
    },

    #[error("{what} not found: {key}")]
    NotFound {
        what: &'static str,
        key: String,
        status: Option<u16>,
    },

    #[error("backend error ({code}): {message}")]
    Backend {
        code: BackendErrorCode,
        status: Option<u16>,
        message: String,
    },

    #[error("{operation} exceeded its deadline of {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("{message}")]
    Protocol { code: i32, message: String },
}

pub type BridgeResult<T> = Result<T, BridgeError>;

/// JSON-RPC error code used when a second conversation tries to bind while
/// one is already active.
pub const SESSION_ALREADY_ACTIVE: i32 = -32000;
/// JSON-RPC error code for calls that reference a missing or stale session.
pub const SESSION_NOT_FOUND: i32 = -32001;
/// JSON-RPC error code for calls arriving in a state that does not accept them.
pub const SESSION_NOT_READY: i32 = -32002;
/// JSON-RPC error code for session calls whose override headers disagree with
/// the context bound at `initialize`.
pub const SESSION_CONTEXT_CONFLICT: i32 = -32003;

impl BridgeError {
    pub fn validation(message: impl Into<String>) -> Self {
        BridgeError::Validation {
            message: message.into(),
            status: None,
        }
    }

    pub fn not_found(what: &'static str, key: impl Into<String>) -> Self {
        BridgeError::NotFound {
            what,
            key: key.into(),
            status: None,
        }
    }

    pub fn backend(code: BackendErrorCode, status: Option<u16>, message: impl Into<String>) -> Self {
        BridgeError::Backend {
            code,
            status,
            message: message.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        BridgeError::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    pub fn protocol(code: i32, message: impl Into<String>) -> Self {
        BridgeError::Protocol {
            code,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::Validation { .. } => ErrorKind::Validation,
            BridgeError::NotFound { .. } => ErrorKind::NotFound,
            BridgeError::Backend { .. } => ErrorKind::Backend,
            BridgeError::Timeout { .. } => ErrorKind::Timeout,
            BridgeError::Protocol { .. } => ErrorKind::Protocol,
        }
    }

    /// Original remote status code, when the error came from the backend.
    pub fn status(&self) -> Option<u16> {
        match self {
            BridgeError::Validation { status, .. }
            | BridgeError::NotFound { status, .. }
            | BridgeError::Backend { status, .. } => *status,
            _ => None,
        }
    }

    /// Backend sub-kind, if any.
    pub fn backend_code(&self) -> Option<BackendErrorCode> {
        match self {
            BridgeError::Backend { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Diagnostic payload attached to user-visible failures.
    pub fn detail(&self) -> ErrorDetail {
        ErrorDetail {
            message: self.to_string(),
            code: self.backend_code().map(|c| c.as_str().to_string()),
            status: self.status(),
        }
    }
}

/// Human readable failure description carried by results and replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorDetail {
    pub fn to_json(&self, kind: ErrorKind) -> Value {
        json!({
            "errorKind": kind.as_str(),
            "message": self.message,
            "code": self.code,
            "status": self.status,
        })
    }
}

/// Removes every occurrence of `secret` from `text`.
///
/// Used on anything derived from remote responses before it reaches a log
/// line or an error message.
pub fn redact(text: &str, secret: &str) -> String {
    if secret.len() < 4 {
        return text.to_string();
    }
    text.replace(secret, "[redacted]")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_match_wire_contract() {
        assert_eq!(
            serde_json::to_value(ErrorKind::Timeout).unwrap(),
            json!("TimeoutError")
        );
        assert_eq!(
            serde_json::to_value(BackendErrorCode::RateLimited).unwrap(),
            json!("RATE_LIMITED")
        );
        assert_eq!(ErrorKind::Protocol.to_string(), "ProtocolError");
    }

    #[test]
    fn test_detail_carries_status_and_code() {
        let err = BridgeError::backend(BackendErrorCode::ServerError, Some(503), "unavailable");
        let detail = err.detail();
        assert_eq!(detail.code.as_deref(), Some("SERVER_ERROR"));
        assert_eq!(detail.status, Some(503));
        assert!(detail.message.contains("unavailable"));
        assert_eq!(err.kind(), ErrorKind::Backend);
    }

    #[test]
    fn test_not_found_message() {
        let err = BridgeError::not_found("node", "vendor.missing");
        assert_eq!(err.to_string(), "node not found: vendor.missing");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.detail().code.is_none());
    }

    #[test]
    fn test_redact() {
        assert_eq!(
            redact("bad key n8n_abcdef given", "n8n_abcdef"),
            "bad key [redacted] given"
        );
        // Very short secrets are left alone to avoid mangling text
        assert_eq!(redact("abc", "ab"), "abc");
    }
}
