//! Session and context override headers.

use axum::http::{HeaderMap, HeaderName};

use crate::context::ContextOverride;
use crate::error::{BridgeError, BridgeResult};

pub const SESSION_HEADER: &str = "mcp-session-id";
pub const BACKEND_URL_HEADER: &str = "x-backend-url";
pub const BACKEND_API_KEY_HEADER: &str = "x-backend-api-key";
pub const BACKEND_TIMEOUT_HEADER: &str = "x-backend-timeout-ms";
pub const BACKEND_MAX_RETRIES_HEADER: &str = "x-backend-max-retries";
pub const TENANT_HEADER: &str = "x-tenant-id";

/// Headers whose values must never be logged.
pub const CREDENTIAL_HEADERS: &[&str] = &[
    BACKEND_API_KEY_HEADER,
    "authorization",
    "cookie",
    "x-api-key",
];

pub fn is_credential_header(name: &HeaderName) -> bool {
    CREDENTIAL_HEADERS.contains(&name.as_str())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> BridgeResult<Option<&'a str>> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(|v| Some(v.trim()))
            .map_err(|_| BridgeError::validation(format!("{} is not valid text", name))),
    }
}

fn header_int(headers: &HeaderMap, name: &str) -> BridgeResult<Option<i64>> {
    match header_str(headers, name)? {
        None => Ok(None),
        Some(raw) => raw
            .parse::<i64>()
            .map(Some)
            .map_err(|_| BridgeError::validation(format!("{} must be an integer", name))),
    }
}

pub fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Context fields carried by request headers. `Ok(None)` when none is set.
pub fn context_override(headers: &HeaderMap) -> BridgeResult<Option<ContextOverride>> {
    let context_override = ContextOverride {
        backend_base_url: header_str(headers, BACKEND_URL_HEADER)?.map(str::to_string),
        backend_api_key: header_str(headers, BACKEND_API_KEY_HEADER)?.map(str::to_string),
        timeout_ms: header_int(headers, BACKEND_TIMEOUT_HEADER)?,
        max_retries: header_int(headers, BACKEND_MAX_RETRIES_HEADER)?,
        tenant_id: header_str(headers, TENANT_HEADER)?.map(str::to_string),
        metadata: None,
    };
    Ok((!context_override.is_empty()).then_some(context_override))
}
