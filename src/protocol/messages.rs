//! MCP Protocol Types
//!
//! MCP is JSON-RPC 2.0 with specific method names and schemas.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

use crate::context::ContextOverride;
use crate::error::{
    BridgeError, ErrorKind, SESSION_ALREADY_ACTIVE, SESSION_CONTEXT_CONFLICT, SESSION_NOT_FOUND,
    SESSION_NOT_READY,
};

/// JSON-RPC version string
pub const JSONRPC_VERSION: &str = "2.0";

/// Protocol version announced when the client asks for one we do not know.
pub const MCP_PROTOCOL_VERSION: &str = "2025-03-26";

pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2024-11-05", "2025-03-26", "2025-06-18"];

/// Echo the client's version when supported, otherwise answer with ours.
pub fn negotiate_protocol_version(requested: Option<&str>) -> String {
    match requested {
        Some(v) if SUPPORTED_PROTOCOL_VERSIONS.contains(&v) => v.to_string(),
        _ => MCP_PROTOCOL_VERSION.to_string(),
    }
}

// ============================================================================
// Core Message Types
// ============================================================================

/// Request ID can be string or number
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(i64),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::String(s) => write!(f, "{}", s),
            RequestId::Number(n) => write!(f, "{}", n),
        }
    }
}

/// Response to MCP client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpResponse {
    pub jsonrpc: String,
    pub id: Option<RequestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<McpErrorResponse>,
}

impl McpResponse {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<RequestId>, error: McpError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Server-initiated message without an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl McpNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }

    pub fn progress(token: Value, progress: f64, total: Option<f64>, message: Option<&str>) -> Self {
        let mut params = json!({
            "progressToken": token,
            "progress": progress,
        });
        if let Some(total) = total {
            params["total"] = json!(total);
        }
        if let Some(message) = message {
            params["message"] = json!(message);
        }
        Self::new(methods::PROGRESS, Some(params))
    }
}

/// Error response structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpErrorResponse {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

// ============================================================================
// Error Codes (JSON-RPC + session specific)
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum McpError {
    // JSON-RPC standard errors
    ParseError(String),
    InvalidRequest(String),
    MethodNotFound(String),
    InvalidParams(String),
    InternalError(String),

    // Session errors
    SessionAlreadyActive,
    SessionNotFound(String),
    SessionNotReady(String),
    SessionContextConflict(String),

    /// A library error surfaced outside of a tool result.
    Bridge { kind: ErrorKind, message: String },
}

impl McpError {
    pub fn code(&self) -> i32 {
        match self {
            McpError::ParseError(_) => -32700,
            McpError::InvalidRequest(_) => -32600,
            McpError::MethodNotFound(_) => -32601,
            McpError::InvalidParams(_) => -32602,
            McpError::InternalError(_) => -32603,
            McpError::SessionAlreadyActive => SESSION_ALREADY_ACTIVE,
            McpError::SessionNotFound(_) => SESSION_NOT_FOUND,
            McpError::SessionNotReady(_) => SESSION_NOT_READY,
            McpError::SessionContextConflict(_) => SESSION_CONTEXT_CONFLICT,
            McpError::Bridge { kind, .. } => match kind {
                ErrorKind::Validation => -32602,
                _ => -32603,
            },
        }
    }

    pub fn message(&self) -> String {
        match self {
            McpError::ParseError(msg) => format!("Parse error: {}", msg),
            McpError::InvalidRequest(msg) => format!("Invalid request: {}", msg),
            McpError::MethodNotFound(method) => format!("Method not found: {}", method),
            McpError::InvalidParams(msg) => format!("Invalid params: {}", msg),
            McpError::InternalError(msg) => format!("Internal error: {}", msg),
            McpError::SessionAlreadyActive => "session already active".to_string(),
            McpError::SessionNotFound(msg) => msg.clone(),
            McpError::SessionNotReady(msg) => msg.clone(),
            McpError::SessionContextConflict(msg) => msg.clone(),
            McpError::Bridge { message, .. } => message.clone(),
        }
    }

    /// Error kind from the bridge taxonomy, reported in `error.data`.
    pub fn kind(&self) -> ErrorKind {
        match self {
            McpError::InvalidParams(_) => ErrorKind::Validation,
            McpError::Bridge { kind, .. } => *kind,
            _ => ErrorKind::Protocol,
        }
    }
}

impl From<BridgeError> for McpError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Protocol { code, message } => match code {
                SESSION_ALREADY_ACTIVE => McpError::SessionAlreadyActive,
                SESSION_NOT_FOUND => McpError::SessionNotFound(message),
                SESSION_NOT_READY => McpError::SessionNotReady(message),
                SESSION_CONTEXT_CONFLICT => McpError::SessionContextConflict(message),
                -32700 => McpError::ParseError(message),
                -32600 => McpError::InvalidRequest(message),
                -32601 => McpError::MethodNotFound(message),
                -32602 => McpError::InvalidParams(message),
                _ => McpError::InternalError(message),
            },
            other => McpError::Bridge {
                kind: other.kind(),
                message: other.to_string(),
            },
        }
    }
}

impl From<McpError> for McpErrorResponse {
    fn from(err: McpError) -> Self {
        McpErrorResponse {
            code: err.code(),
            message: err.message(),
            data: Some(json!({ "errorKind": err.kind().as_str() })),
        }
    }
}

// ============================================================================
// Method Names
// ============================================================================

pub mod methods {
    // Lifecycle
    pub const INITIALIZE: &str = "initialize";
    pub const INITIALIZED: &str = "notifications/initialized";
    pub const SHUTDOWN: &str = "shutdown";

    // Tools
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";

    // Notifications
    pub const PROGRESS: &str = "notifications/progress";
    pub const CANCELLED: &str = "notifications/cancelled";

    // Ping
    pub const PING: &str = "ping";
}

// ============================================================================
// Initialize Messages
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InitializeParams {
    pub protocol_version: Option<String>,
    pub capabilities: Value,
    pub client_info: Option<ClientInfo>,
    /// Per-session backend configuration, same fields as the override headers.
    pub context: Option<ContextOverride>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    pub server_info: ServerInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerCapabilities {
    pub tools: ToolsCapability,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsCapability {
    pub list_changed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

// ============================================================================
// Tools Messages
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ToolsListResult {
    pub tools: Vec<ToolDefinition>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolAnnotations {
    pub read_only: bool,
    pub requires_backend: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub annotations: ToolAnnotations,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestMeta {
    pub progress_token: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolsCallParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Value>,
    #[serde(default, rename = "_meta")]
    pub meta: Option<RequestMeta>,
}

impl ToolsCallParams {
    pub fn progress_token(&self) -> Option<Value> {
        self.meta.as_ref().and_then(|m| m.progress_token.clone())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsCallResult {
    pub content: Vec<ToolResultContent>,
    pub is_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolResultContent {
    Text { text: String },
}

impl ToolsCallResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolResultContent::Text { text: text.into() }],
            is_error: false,
            structured_content: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::text(message)
        }
    }

    pub fn with_structured(mut self, value: Value) -> Self {
        self.structured_content = Some(value);
        self
    }
}

// ============================================================================
// Ping
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct PingResult {}
