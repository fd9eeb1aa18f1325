//! Resolved per-call / per-session configuration.
//!
//! A [`Context`] says where and how backend calls are made. It is produced by
//! the [`ContextResolver`] and never mutated afterwards.

mod resolver;

pub use resolver::{ContextDefaults, ContextResolver, FallbackContext};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Backend credential. Never printed by `Debug` or `Display`.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Short stable digest, safe to use in cache keys and logs.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        digest[..6].iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "ApiKey(<empty>)")
        } else {
            write!(f, "ApiKey(<redacted>)")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    /// Absolute http(s) base URL without trailing slash. `None` when the
    /// process runs catalog-only.
    pub backend_base_url: Option<String>,
    pub backend_api_key: ApiKey,
    pub timeout_ms: u64,
    pub max_retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl Context {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }

    pub fn has_backend(&self) -> bool {
        self.backend_base_url.is_some()
    }

    /// Names of the override fields that disagree with this context. Fields
    /// the override leaves out never conflict.
    pub fn conflicting_fields(&self, o: &ContextOverride) -> Vec<&'static str> {
        let mut conflicts = Vec::new();
        if let Some(url) = &o.backend_base_url {
            if self.backend_base_url.as_deref() != Some(url.trim().trim_end_matches('/')) {
                conflicts.push("backendBaseUrl");
            }
        }
        if let Some(key) = &o.backend_api_key {
            if key.trim() != self.backend_api_key.expose() {
                conflicts.push("backendApiKey");
            }
        }
        if o.timeout_ms.is_some_and(|ms| ms != self.timeout_ms as i64) {
            conflicts.push("timeoutMs");
        }
        if o.max_retries.is_some_and(|n| n != self.max_retries as i64) {
            conflicts.push("maxRetries");
        }
        if let Some(tenant) = &o.tenant_id {
            if self.tenant_id.as_deref() != Some(tenant.as_str()) {
                conflicts.push("tenantId");
            }
        }
        if o.metadata.as_ref().is_some_and(|m| *m != self.metadata) {
            conflicts.push("metadata");
        }
        conflicts
    }

    /// Backend base URL, or a validation error when none is configured.
    pub fn require_backend(&self) -> crate::error::BridgeResult<&str> {
        self.backend_base_url.as_deref().ok_or_else(|| {
            crate::error::BridgeError::validation(
                "no backend is configured for this call (set backendBaseUrl)",
            )
        })
    }
}

/// Per-call override, as received from headers or `initialize` params.
///
/// Numeric fields are signed so that negative values can be reported as
/// validation failures instead of decode failures.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContextOverride {
    pub backend_base_url: Option<String>,
    pub backend_api_key: Option<String>,
    pub timeout_ms: Option<i64>,
    pub max_retries: Option<i64>,
    pub tenant_id: Option<String>,
    pub metadata: Option<BTreeMap<String, Value>>,
}

impl ContextOverride {
    pub fn is_empty(&self) -> bool {
        *self == ContextOverride::default()
    }

    /// Field-wise merge, values in `other` win.
    pub fn merged_with(mut self, other: ContextOverride) -> ContextOverride {
        if other.backend_base_url.is_some() {
            self.backend_base_url = other.backend_base_url;
        }
        if other.backend_api_key.is_some() {
            self.backend_api_key = other.backend_api_key;
        }
        if other.timeout_ms.is_some() {
            self.timeout_ms = other.timeout_ms;
        }
        if other.max_retries.is_some() {
            self.max_retries = other.max_retries;
        }
        if other.tenant_id.is_some() {
            self.tenant_id = other.tenant_id;
        }
        if other.metadata.is_some() {
            self.metadata = other.metadata;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_debug_is_redacted() {
        let key = ApiKey::new("super-secret-value");
        let printed = format!("{:?}", key);
        assert!(!printed.contains("super-secret-value"));
        assert_eq!(printed, "ApiKey(<redacted>)");
    }

    #[test]
    fn test_fingerprint_is_stable_and_short() {
        let a = ApiKey::new("k1");
        assert_eq!(a.fingerprint(), ApiKey::new("k1").fingerprint());
        assert_ne!(a.fingerprint(), ApiKey::new("k2").fingerprint());
        assert_eq!(a.fingerprint().len(), 12);
    }

    #[test]
    fn test_override_merge_prefers_other() {
        let base = ContextOverride {
            backend_base_url: Some("http://a".into()),
            timeout_ms: Some(10),
            ..Default::default()
        };
        let merged = base.merged_with(ContextOverride {
            timeout_ms: Some(20),
            ..Default::default()
        });
        assert_eq!(merged.backend_base_url.as_deref(), Some("http://a"));
        assert_eq!(merged.timeout_ms, Some(20));
    }

    #[test]
    fn test_conflicting_fields() {
        let ctx = Context {
            backend_base_url: Some("https://bound.example".to_string()),
            backend_api_key: ApiKey::new("bound-key"),
            timeout_ms: 5_000,
            max_retries: 2,
            tenant_id: Some("acme".to_string()),
            metadata: BTreeMap::new(),
        };

        let same = ContextOverride {
            backend_base_url: Some("https://bound.example/".to_string()),
            backend_api_key: Some("bound-key".to_string()),
            timeout_ms: Some(5_000),
            tenant_id: Some("acme".to_string()),
            ..Default::default()
        };
        assert!(ctx.conflicting_fields(&same).is_empty());

        let other = ContextOverride {
            backend_base_url: Some("http://other-tenant.example".to_string()),
            max_retries: Some(7),
            ..Default::default()
        };
        assert_eq!(
            ctx.conflicting_fields(&other),
            vec!["backendBaseUrl", "maxRetries"]
        );
    }

    #[test]
    fn test_override_deserializes_camel_case() {
        let o: ContextOverride = serde_json::from_value(serde_json::json!({
            "backendBaseUrl": "https://x.example",
            "maxRetries": 1,
            "metadata": {"team": "ops"}
        }))
        .unwrap();
        assert_eq!(o.backend_base_url.as_deref(), Some("https://x.example"));
        assert_eq!(o.max_retries, Some(1));
        assert!(!o.is_empty());
    }
}
