//! Tool Execution Context
//!
//! Gives tool handlers access to the resolved configuration and the shared
//! catalog and backend.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

use crate::backend::BackendClient;
use crate::catalog::Catalog;
use crate::context::Context;
use crate::protocol::McpNotification;

/// Where a handler reports progress. Disabled for request/response calls.
#[derive(Clone, Debug, Default)]
pub struct ProgressSink {
    target: Option<(Value, UnboundedSender<McpNotification>)>,
}

impl ProgressSink {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn new(token: Value, sender: UnboundedSender<McpNotification>) -> Self {
        Self {
            target: Some((token, sender)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.target.is_some()
    }

    /// Emit a `notifications/progress` frame. A closed receiver is ignored.
    pub fn report(&self, progress: f64, total: Option<f64>, message: Option<&str>) {
        if let Some((token, sender)) = &self.target {
            let _ = sender.send(McpNotification::progress(
                token.clone(),
                progress,
                total,
                message,
            ));
        }
    }
}

/// Context provided to tool handlers during execution
#[derive(Clone)]
pub struct ToolContext {
    /// Configuration resolved for this call, or bound to the session
    pub context: Arc<Context>,

    /// Node and template catalog
    pub catalog: Arc<Catalog>,

    /// Remote backend access
    pub backend: Arc<BackendClient>,

    pub progress: ProgressSink,

    /// Session the call belongs to, `None` for session-less calls
    pub session_id: Option<String>,

    /// Process start time (for uptime calculation)
    pub start_time: Instant,
}

impl ToolContext {
    /// Backend base URL, or a validation error in catalog-only mode.
    pub fn require_backend(&self) -> crate::error::BridgeResult<&str> {
        self.context.require_backend()
    }
}
