//! Remote workflow backend access.

mod client;
mod resources;
mod retry_policy;
mod version;

pub use client::{map_status, BackendClient, BackendResponse};
pub use resources::{ExecutionQuery, WorkflowPage, WorkflowQuery};
pub use retry_policy::{is_retryable, RetryPolicy};
pub use version::{
    adapt_payload, default_field_gates, BackendVersion, DetectedVersion, FieldGate, VersionCache,
};

use serde::{Deserialize, Serialize};

pub const DEFAULT_AUTH_HEADER: &str = "X-Api-Key";
pub const DEFAULT_MAX_IN_FLIGHT: usize = 16;

/// Process-wide backend client settings. Per-call values (URL, key, timeout,
/// retries) come from the resolved context instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    pub auth_header: String,
    pub version_probe_path: String,
    pub health_path: String,
    pub api_prefix: String,
    pub max_in_flight: usize,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub connect_timeout_ms: u64,
    pub user_agent: String,
    pub field_gates: Vec<FieldGate>,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            auth_header: DEFAULT_AUTH_HEADER.to_string(),
            version_probe_path: "/api/v1/version".to_string(),
            health_path: "/healthz".to_string(),
            api_prefix: "/api/v1".to_string(),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            retry_base_delay_ms: 1_000,
            retry_max_delay_ms: 30_000,
            connect_timeout_ms: 10_000,
            user_agent: format!("capability-bridge/{}", env!("CARGO_PKG_VERSION")),
            field_gates: default_field_gates(),
        }
    }
}
