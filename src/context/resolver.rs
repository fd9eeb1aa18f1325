use super::{ApiKey, Context, ContextOverride, DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_MS};
use crate::error::{BridgeError, BridgeResult};
use reqwest::Url;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Process-level fallback values (CLI, TOML, environment).
#[derive(Debug, Clone, Default)]
pub struct FallbackContext {
    pub backend_base_url: Option<String>,
    pub backend_api_key: Option<ApiKey>,
    pub timeout_ms: Option<u64>,
    pub max_retries: Option<u32>,
    pub tenant_id: Option<String>,
    pub metadata: BTreeMap<String, Value>,
}

/// Built-in defaults, the lowest precedence layer.
#[derive(Debug, Clone)]
pub struct ContextDefaults {
    pub timeout_ms: u64,
    pub max_retries: u32,
    /// When true, a context with a backend URL must also carry an API key.
    pub require_api_key: bool,
}

impl Default for ContextDefaults {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            require_api_key: true,
        }
    }
}

/// Resolves override → fallback → defaults into a validated [`Context`].
#[derive(Debug, Clone, Default)]
pub struct ContextResolver {
    fallback: FallbackContext,
    defaults: ContextDefaults,
}

impl ContextResolver {
    pub fn new(fallback: FallbackContext, defaults: ContextDefaults) -> Self {
        Self { fallback, defaults }
    }

    pub fn fallback(&self) -> &FallbackContext {
        &self.fallback
    }

    /// Resolve a context. Any invalid override field fails the whole call;
    /// there is no silent fallback to a lower layer for a field that was
    /// explicitly provided.
    pub fn resolve(&self, request_override: Option<&ContextOverride>) -> BridgeResult<Context> {
        let empty = ContextOverride::default();
        let o = request_override.unwrap_or(&empty);

        let fallback_url = match &self.fallback.backend_base_url {
            Some(url) => Some(normalize_base_url(url)?),
            None => None,
        };
        let backend_base_url = match &o.backend_base_url {
            Some(url) => Some(normalize_base_url(url)?),
            None => fallback_url.clone(),
        };
        // The fallback key only ever travels to the fallback backend.
        let inherits_key = backend_base_url == fallback_url;

        let backend_api_key = match &o.backend_api_key {
            Some(key) if key.trim().is_empty() => {
                return Err(BridgeError::validation("backendApiKey must not be empty"));
            }
            Some(key) => ApiKey::new(key.trim()),
            None if inherits_key => self.fallback.backend_api_key.clone().unwrap_or_default(),
            None if self.defaults.require_api_key => {
                return Err(BridgeError::validation(
                    "backendApiKey must be provided together with a backendBaseUrl override",
                ));
            }
            None => ApiKey::default(),
        };

        let timeout_ms = match o.timeout_ms {
            Some(ms) if ms <= 0 => {
                return Err(BridgeError::validation(format!(
                    "timeoutMs must be greater than zero, got {}",
                    ms
                )));
            }
            Some(ms) => ms as u64,
            None => self.fallback.timeout_ms.unwrap_or(self.defaults.timeout_ms),
        };

        let max_retries = match o.max_retries {
            Some(n) if n < 0 => {
                return Err(BridgeError::validation(format!(
                    "maxRetries must be zero or greater, got {}",
                    n
                )));
            }
            Some(n) => u32::try_from(n)
                .map_err(|_| BridgeError::validation(format!("maxRetries is too large: {}", n)))?,
            None => self
                .fallback
                .max_retries
                .unwrap_or(self.defaults.max_retries),
        };

        let tenant_id = o
            .tenant_id
            .clone()
            .or_else(|| self.fallback.tenant_id.clone())
            .filter(|t| !t.trim().is_empty());

        let metadata = o
            .metadata
            .clone()
            .unwrap_or_else(|| self.fallback.metadata.clone());

        let context = Context {
            backend_base_url,
            backend_api_key,
            timeout_ms,
            max_retries,
            tenant_id,
            metadata,
        };
        self.validate(&context)?;

        debug!(
            "Resolved context: backend={:?} timeout_ms={} max_retries={} tenant={:?} key={}",
            context.backend_base_url,
            context.timeout_ms,
            context.max_retries,
            context.tenant_id,
            if context.backend_api_key.is_empty() {
                "absent".to_string()
            } else {
                context.backend_api_key.fingerprint()
            }
        );

        Ok(context)
    }

    /// Validate an already-built context, e.g. one restored from a snapshot.
    pub fn validate(&self, context: &Context) -> BridgeResult<()> {
        if let Some(url) = &context.backend_base_url {
            normalize_base_url(url)?;
            if self.defaults.require_api_key && context.backend_api_key.is_empty() {
                return Err(BridgeError::validation(
                    "backendApiKey is required when a backend is configured",
                ));
            }
        }
        if context.timeout_ms == 0 {
            return Err(BridgeError::validation("timeoutMs must be greater than zero"));
        }
        Ok(())
    }
}

/// Parse and normalize a backend base URL: absolute, http(s), no trailing slash.
fn normalize_base_url(raw: &str) -> BridgeResult<String> {
    let trimmed = raw.trim();
    let url = Url::parse(trimmed).map_err(|e| {
        BridgeError::validation(format!(
            "backendBaseUrl is not a valid absolute URL ({}): {}",
            e, trimmed
        ))
    })?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(BridgeError::validation(format!(
            "backendBaseUrl must use http or https, got {}",
            url.scheme()
        )));
    }
    if url.host_str().is_none() {
        return Err(BridgeError::validation("backendBaseUrl must include a host"));
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}
