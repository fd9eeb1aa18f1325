//! Request logging middleware
//!
//! Logs each HTTP exchange at the configured verbosity and records it in the
//! HTTP metrics. Credential headers are never printed.

use super::super::headers::{is_credential_header, SESSION_HEADER};
use super::super::state::ServerState;
use crate::server::metrics::record_http_request;
use axum::{
    body::Body,
    extract::State,
    http::{header::HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::time::Instant;
use tracing::{error, info};

#[derive(PartialEq, PartialOrd, Clone, Debug, Default, clap::ValueEnum, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestsLoggingLevel {
    None,
    #[default]
    Path,
    Headers,
    Body,
}

impl std::fmt::Display for RequestsLoggingLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// JSON-RPC frames above this size are summarized instead of printed.
const MAX_LOGGABLE_BODY_LENGTH: usize = 1024;

fn content_length(headers: &HeaderMap) -> Result<usize, &'static str> {
    headers
        .get(axum::http::header::CONTENT_LENGTH)
        .ok_or("no content-length")?
        .to_str()
        .map_err(|_| "content-length is not text")?
        .parse()
        .map_err(|_| "content-length is not a number")
}

fn log_headers(direction: &str, headers: &HeaderMap) {
    for (name, value) in headers {
        if is_credential_header(name) {
            info!("  {} {}: <redacted>", direction, name);
        } else {
            info!("  {} {}: {:?}", direction, name, value);
        }
    }
}

/// Print a small body and hand back an equivalent one. Streamed bodies
/// (SSE) carry no content length and pass through untouched.
async fn log_body(direction: &str, headers: &HeaderMap, body: Body) -> Result<Body, StatusCode> {
    let size = match content_length(headers) {
        Ok(size) => size,
        Err(reason) => {
            info!("  {} body: {}", direction, reason);
            return Ok(body);
        }
    };
    if size >= MAX_LOGGABLE_BODY_LENGTH {
        info!(
            "  {} body: {:#} not shown",
            direction,
            byte_unit::Byte::from(size)
        );
        return Ok(body);
    }

    let bytes = axum::body::to_bytes(body, size).await.map_err(|err| {
        error!("Failed to buffer {} body: {:?}", direction, err);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    info!("  {} body: {}", direction, String::from_utf8_lossy(&bytes));
    Ok(Body::from(bytes))
}

pub async fn log_requests(
    State(state): State<ServerState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let level = state.config.requests_logging_level.clone();
    let start = Instant::now();

    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    if level > RequestsLoggingLevel::None {
        let session = request
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-");
        info!(">>> {} {} [session {}]", method, request.uri(), session);
    }
    if level >= RequestsLoggingLevel::Headers {
        log_headers(">", request.headers());
    }

    let request = if level >= RequestsLoggingLevel::Body {
        let (parts, body) = request.into_parts();
        match log_body(">", &parts.headers, body).await {
            Ok(body) => Request::from_parts(parts, body),
            Err(status) => return status.into_response(),
        }
    } else {
        request
    };

    let mut response = next.run(request).await;

    if level >= RequestsLoggingLevel::Headers {
        log_headers("<", response.headers());
    }
    if level >= RequestsLoggingLevel::Body {
        let (parts, body) = response.into_parts();
        response = match log_body("<", &parts.headers, body).await {
            Ok(body) => Response::from_parts(parts, body),
            Err(status) => return status.into_response(),
        };
    }

    let status = response.status().as_u16();
    let elapsed = start.elapsed();
    if level > RequestsLoggingLevel::None {
        info!("<<< {} {} {} ({}ms)", method, path, status, elapsed.as_millis());
    }
    record_http_request(&method, &path, status, elapsed);

    response
}
