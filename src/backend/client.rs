//! HTTP client for the remote workflow backend.

use super::retry_policy::RetryPolicy;
use super::version::{adapt_payload, DetectedVersion, FieldGate, VersionCache};
use super::BackendSettings;
use crate::context::Context;
use crate::error::{redact, BackendErrorCode, BridgeError, BridgeResult};
use crate::server::metrics;
use reqwest::header::{HeaderName, HeaderValue, ACCEPT};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

/// A successful backend reply.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendResponse {
    pub status: u16,
    pub body: Value,
    /// Retries performed before this reply (0 when the first attempt succeeded).
    pub retries: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

pub struct BackendClient {
    settings: BackendSettings,
    auth_header: HeaderName,
    clients: Mutex<HashMap<String, reqwest::Client>>,
    versions: VersionCache,
    permits: Arc<Semaphore>,
}

impl BackendClient {
    pub fn new(settings: BackendSettings) -> anyhow::Result<Self> {
        let auth_header = HeaderName::from_bytes(settings.auth_header.as_bytes()).map_err(|e| {
            anyhow::anyhow!("Invalid auth header name {:?}: {}", settings.auth_header, e)
        })?;
        if settings.max_in_flight == 0 {
            anyhow::bail!("max_in_flight must be at least 1");
        }
        Ok(Self {
            permits: Arc::new(Semaphore::new(settings.max_in_flight)),
            auth_header,
            clients: Mutex::new(HashMap::new()),
            versions: VersionCache::default(),
            settings,
        })
    }

    pub fn settings(&self) -> &BackendSettings {
        &self.settings
    }

    /// Permits currently available for new requests.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn cached_versions(&self) -> usize {
        self.versions.len()
    }

    /// Release the pooled client and cached versions for `base_url`.
    pub fn forget(&self, base_url: &str) {
        let base_url = base_url.trim_end_matches('/');
        let dropped_client = self
            .clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(base_url)
            .is_some();
        let dropped_versions = self.versions.forget(base_url);
        if dropped_client || dropped_versions > 0 {
            info!(
                "Released backend pool for {} ({} cached versions)",
                base_url, dropped_versions
            );
        }
    }

    fn client_for(&self, base_url: &str) -> BridgeResult<reqwest::Client> {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = clients.get(base_url) {
            return Ok(client.clone());
        }
        let client = reqwest::Client::builder()
            .user_agent(self.settings.user_agent.clone())
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(Duration::from_millis(self.settings.connect_timeout_ms))
            .build()
            .map_err(|e| {
                BridgeError::backend(
                    BackendErrorCode::NetworkError,
                    None,
                    format!("failed to create HTTP client: {}", e),
                )
            })?;
        clients.insert(base_url.to_string(), client.clone());
        Ok(client)
    }

    /// Issue one logical call, retrying transient failures, bounded by
    /// `context.timeout_ms` overall.
    pub async fn call(
        &self,
        context: &Context,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> BridgeResult<BackendResponse> {
        let operation = format!("{} {}", method, path);
        let deadline = Instant::now() + context.timeout();
        let started = std::time::Instant::now();

        let result = match timeout_at(
            deadline,
            self.call_with_retries(context, method, path, body, deadline),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(BridgeError::timeout(
                format!("backend call {}", operation),
                context.timeout_ms,
            )),
        };

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.backend_code().map_or(e.kind().as_str(), |c| c.as_str()),
        };
        metrics::record_backend_call(outcome, started.elapsed());
        if let Ok(response) = &result {
            metrics::record_backend_retries(response.retries);
        }
        result
    }

    async fn call_with_retries(
        &self,
        context: &Context,
        method: Method,
        path: &str,
        body: Option<Value>,
        deadline: Instant,
    ) -> BridgeResult<BackendResponse> {
        let base_url = context.require_backend()?;
        let client = self.client_for(base_url)?;
        let version = self.detect_version(context, &client, base_url).await?;

        let body = body.map(|mut body| {
            let stripped = adapt_payload(&mut body, version, &self.settings.field_gates);
            if !stripped.is_empty() {
                debug!(
                    "Stripped fields unsupported by backend {:?}: {:?}",
                    version.known(),
                    stripped
                );
            }
            body
        });

        let policy = RetryPolicy {
            max_retries: context.max_retries,
            base_delay: Duration::from_millis(self.settings.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.settings.retry_max_delay_ms),
            ..RetryPolicy::default()
        };
        let url = join_url(base_url, path);
        let mut retries = 0;

        loop {
            let attempt = self
                .send_once(&client, context, method.clone(), &url, body.as_ref())
                .await;
            match attempt {
                Ok((status, body)) => {
                    return Ok(BackendResponse {
                        status,
                        body,
                        retries,
                        version: version.known().map(|v| v.to_string()),
                    });
                }
                Err(error) if policy.should_retry(&error, retries) => {
                    let delay = policy.delay(retries);
                    if Instant::now() + delay >= deadline {
                        warn!(
                            "Giving up on {} {} after {} retries: next backoff passes the deadline",
                            method, path, retries
                        );
                        return Err(error);
                    }
                    retries += 1;
                    debug!(
                        "Retrying {} {} in {:?} (retry {}/{}): {}",
                        method, path, delay, retries, policy.max_retries, error
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// One HTTP exchange. Holds a permit only while the request is in flight.
    async fn send_once(
        &self,
        client: &reqwest::Client,
        context: &Context,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> BridgeResult<(u16, Value)> {
        let _permit = self.permits.acquire().await.map_err(|_| {
            BridgeError::backend(
                BackendErrorCode::NetworkError,
                None,
                "backend client is shutting down",
            )
        })?;

        let mut request = client
            .request(method, url)
            .header(ACCEPT, "application/json");
        if !context.backend_api_key.is_empty() {
            let value = HeaderValue::from_str(context.backend_api_key.expose()).map_err(|_| {
                BridgeError::validation("backendApiKey contains characters not allowed in a header")
            })?;
            request = request.header(self.auth_header.clone(), value);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let secret = context.backend_api_key.expose();
        let response = request.send().await.map_err(|e| {
            BridgeError::backend(
                BackendErrorCode::NetworkError,
                None,
                redact(&e.to_string(), secret),
            )
        })?;
        let status = response.status();
        let text = response.text().await.map_err(|e| {
            BridgeError::backend(
                BackendErrorCode::NetworkError,
                Some(status.as_u16()),
                redact(&e.to_string(), secret),
            )
        })?;

        if status.is_success() {
            Ok((status.as_u16(), parse_body(&text)))
        } else {
            Err(map_status(status, &text, secret))
        }
    }

    /// Probe the backend version once per (base URL, key).
    async fn detect_version(
        &self,
        context: &Context,
        client: &reqwest::Client,
        base_url: &str,
    ) -> BridgeResult<DetectedVersion> {
        let fingerprint = context.backend_api_key.fingerprint();
        if let Some(version) = self.versions.get(base_url, &fingerprint) {
            return Ok(version);
        }

        let url = join_url(base_url, &self.settings.version_probe_path);
        match self.send_once(client, context, Method::GET, &url, None).await {
            Ok((_, body)) => {
                let version = body
                    .get("version")
                    .and_then(Value::as_str)
                    .and_then(super::version::BackendVersion::parse)
                    .map_or(DetectedVersion::Unknown, DetectedVersion::Known);
                info!("Detected backend version at {}: {:?}", base_url, version);
                self.versions.insert(base_url, &fingerprint, version);
                Ok(version)
            }
            Err(error)
                if matches!(
                    error.backend_code(),
                    Some(BackendErrorCode::AuthFailed) | Some(BackendErrorCode::AccessDenied)
                ) =>
            {
                Err(error)
            }
            Err(error) if error.backend_code() == Some(BackendErrorCode::NetworkError) => {
                // Not cached: the backend never answered.
                debug!("Version probe for {} failed: {}", base_url, error);
                Ok(DetectedVersion::Unknown)
            }
            Err(error) => {
                debug!("Version probe for {} gave no version: {}", base_url, error);
                self.versions
                    .insert(base_url, &fingerprint, DetectedVersion::Unknown);
                Ok(DetectedVersion::Unknown)
            }
        }
    }

    pub fn field_gates(&self) -> &[FieldGate] {
        &self.settings.field_gates
    }
}

fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Map a non-success status onto the error taxonomy.
pub fn map_status(status: StatusCode, body: &str, secret: &str) -> BridgeError {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| {
            let trimmed: String = body.chars().take(200).collect();
            if trimmed.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            } else {
                trimmed
            }
        });
    let message = redact(&detail, secret);
    let code = status.as_u16();

    match status {
        StatusCode::UNAUTHORIZED => {
            BridgeError::backend(BackendErrorCode::AuthFailed, Some(code), message)
        }
        StatusCode::FORBIDDEN => {
            BridgeError::backend(BackendErrorCode::AccessDenied, Some(code), message)
        }
        StatusCode::TOO_MANY_REQUESTS => {
            BridgeError::backend(BackendErrorCode::RateLimited, Some(code), message)
        }
        StatusCode::NOT_FOUND => BridgeError::NotFound {
            what: "backend resource",
            key: message,
            status: Some(code),
        },
        s if s.is_server_error() => {
            BridgeError::backend(BackendErrorCode::ServerError, Some(code), message)
        }
        _ => BridgeError::Validation {
            message: format!("backend rejected the request: {}", message),
            status: Some(code),
        },
    }
}
