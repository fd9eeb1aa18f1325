use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use super::headers::{self, SESSION_HEADER};
use super::{health, log_requests, metrics, state::*, stream, ServerConfig};
use crate::bridge::{Bridge, BridgeReply, CallOrigin};
use crate::error::{BridgeError, SESSION_NOT_FOUND};
use crate::protocol::{self, Call, McpError, McpResponse};

/// Body of a JSON-RPC reply, with the status code the transport uses for it.
pub(super) fn json_rpc_reply(status: StatusCode, response: &McpResponse) -> Response {
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        protocol::encode(response),
    )
        .into_response()
}

/// Decode the body and the override headers. `Err` is the reply to send
/// back without reaching the bridge.
pub(super) fn decode_call(
    headers: &HeaderMap,
    body: &[u8],
) -> std::result::Result<(Call, CallOrigin), Response> {
    let call = protocol::decode(body).map_err(|e| {
        debug!("Rejected frame: {}", e.error.message());
        json_rpc_reply(StatusCode::BAD_REQUEST, &e.into_response())
    })?;

    let context_override = headers::context_override(headers).map_err(|e| {
        json_rpc_reply(
            StatusCode::BAD_REQUEST,
            &McpResponse::error(call.id().cloned(), McpError::from(e)),
        )
    })?;

    let origin =
        CallOrigin::request_response(headers::session_id(headers)).with_override(context_override);
    Ok((call, origin))
}

async fn post_mcp(
    State(bridge): State<GuardedBridge>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let (call, origin) = match decode_call(&headers, &body) {
        Ok(decoded) => decoded,
        Err(reply) => return reply,
    };

    match bridge.handle(call, origin).await {
        BridgeReply::Accepted => StatusCode::ACCEPTED.into_response(),
        BridgeReply::Response {
            response,
            session_id,
        } => {
            let mut reply = json_rpc_reply(StatusCode::OK, &response);
            if let Some(value) = session_id.and_then(|id| HeaderValue::from_str(&id).ok()) {
                reply.headers_mut().insert(SESSION_HEADER, value);
            }
            reply
        }
    }
}

async fn delete_mcp(State(bridge): State<GuardedBridge>, headers: HeaderMap) -> Response {
    let Some(session_id) = headers::session_id(&headers) else {
        return (
            StatusCode::BAD_REQUEST,
            format!("Missing {} header", SESSION_HEADER),
        )
            .into_response();
    };

    match bridge.close_session(Some(&session_id)).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(err) => {
            let status = match &err {
                BridgeError::Protocol {
                    code: SESSION_NOT_FOUND,
                    ..
                } => StatusCode::NOT_FOUND,
                _ => StatusCode::CONFLICT,
            };
            (status, err.to_string()).into_response()
        }
    }
}

pub fn make_app(config: ServerConfig, bridge: Arc<Bridge>) -> Router {
    let state = ServerState::new(config, bridge);

    let mcp_routes: Router = Router::new()
        .route("/mcp", post(post_mcp).delete(delete_mcp))
        .route("/mcp/stream", post(stream::post_mcp_stream))
        .with_state(state.clone());

    let app: Router = Router::new()
        .route("/", get(health::home))
        .route("/health", get(health::health))
        .route("/metrics", get(metrics::metrics_handler))
        .with_state(state.clone())
        .merge(mcp_routes);

    app.layer(middleware::from_fn_with_state(state, log_requests))
}

/// Serve HTTP until `shutdown` is cancelled.
pub async fn run_server(
    config: ServerConfig,
    bridge: Arc<Bridge>,
    shutdown: CancellationToken,
) -> Result<()> {
    let address = format!("{}:{}", config.bind_address, config.port);
    let addr: SocketAddr = address
        .parse()
        .with_context(|| format!("Invalid listen address {}", address))?;
    let app = make_app(config, bridge);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("HTTP server failed")
}
