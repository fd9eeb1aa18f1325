//! Streaming transport: one JSON-RPC call answered as a server-sent event
//! stream.
//!
//! The stream opens with a `handshake` event, forwards progress as
//! `notification` events and ends with exactly one `message` event carrying
//! the reply. On `initialize` the `message` event id is the new session id.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error};

use super::server::decode_call;
use super::state::GuardedBridge;
use crate::bridge::{BridgeReply, CallOrigin};
use crate::protocol::{self, McpError, McpNotification, McpResponse};
use crate::session::TransportMode;

pub const HANDSHAKE_EVENT: &str = "handshake";
pub const NOTIFICATION_EVENT: &str = "notification";
pub const MESSAGE_EVENT: &str = "message";

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

fn notification_event(notification: &McpNotification) -> Event {
    Event::default()
        .event(NOTIFICATION_EVENT)
        .data(protocol::encode(notification))
}

pub async fn post_mcp_stream(
    State(bridge): State<GuardedBridge>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let (call, origin) = match decode_call(&headers, &body) {
        Ok(decoded) => decoded,
        Err(reply) => return reply,
    };

    let Some(request_id) = call.id().cloned() else {
        // Nothing to correlate a stream with.
        bridge.handle(call, origin).await;
        return StatusCode::ACCEPTED.into_response();
    };

    let (notes_tx, mut notes_rx) = mpsc::unbounded_channel::<McpNotification>();
    let origin = CallOrigin {
        transport: TransportMode::Streaming,
        notifications: Some(notes_tx),
        ..origin
    };
    let (events_tx, events_rx) = mpsc::channel::<Result<Event, Infallible>>(32);

    let handshake = Event::default().event(HANDSHAKE_EVENT).data(
        json!({
            "requestId": request_id,
            "sessionId": origin.session_id,
        })
        .to_string(),
    );

    tokio::spawn(async move {
        if events_tx.send(Ok(handshake)).await.is_err() {
            return;
        }

        let mut call_task = tokio::spawn(async move { bridge.handle(call, origin).await });
        let joined = loop {
            tokio::select! {
                biased;
                Some(notification) = notes_rx.recv() => {
                    if events_tx.send(Ok(notification_event(&notification))).await.is_err() {
                        debug!("Stream client went away, abandoning call");
                        call_task.abort();
                        return;
                    }
                }
                joined = &mut call_task => break joined,
            }
        };
        while let Ok(notification) = notes_rx.try_recv() {
            let _ = events_tx.send(Ok(notification_event(&notification))).await;
        }

        let (response, session_id) = match joined {
            Ok(BridgeReply::Response {
                response,
                session_id,
            }) => (response, session_id),
            Ok(BridgeReply::Accepted) => (McpResponse::success(request_id, json!({})), None),
            Err(e) => {
                error!("Streaming call failed: {}", e);
                (
                    McpResponse::error(Some(request_id), McpError::InternalError(e.to_string())),
                    None,
                )
            }
        };

        let mut message = Event::default()
            .event(MESSAGE_EVENT)
            .data(protocol::encode(&response));
        if let Some(session_id) = session_id {
            message = message.id(session_id);
        }
        let _ = events_tx.send(Ok(message)).await;
    });

    Sse::new(ReceiverStream::new(events_rx))
        .keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
        .into_response()
}
