use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::error::{BridgeError, ErrorDetail, ErrorKind};
use crate::protocol::messages::ToolsCallResult;

/// Normalized outcome of one tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<ErrorDetail>,
    pub duration_ms: u64,
}

impl OperationResult {
    pub fn ok(data: Value, elapsed: Duration) -> Self {
        Self {
            success: true,
            data: Some(data),
            error_kind: None,
            error_detail: None,
            duration_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn failed(error: &BridgeError, elapsed: Duration) -> Self {
        Self {
            success: false,
            data: None,
            error_kind: Some(error.kind()),
            error_detail: Some(error.detail()),
            duration_ms: elapsed.as_millis() as u64,
        }
    }

    /// Metrics label for the outcome.
    pub fn outcome(&self) -> &'static str {
        match self.error_kind {
            None => "success",
            Some(kind) => kind.as_str(),
        }
    }

    /// MCP `tools/call` reply: a text block for the model plus the full
    /// envelope as structured content.
    pub fn to_call_result(&self) -> ToolsCallResult {
        let structured = serde_json::to_value(self).unwrap_or(Value::Null);
        let reply = match (&self.data, &self.error_detail) {
            (Some(data), _) if self.success => ToolsCallResult::text(
                serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string()),
            ),
            (_, Some(detail)) => {
                let kind = self.error_kind.map(|k| k.as_str()).unwrap_or("Error");
                ToolsCallResult::error(format!("{}: {}", kind, detail.message))
            }
            _ => ToolsCallResult::text("null"),
        };
        reply.with_structured(structured)
    }
}
