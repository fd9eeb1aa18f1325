//! HTTP client for end-to-end tests
//!
//! Wraps reqwest with helpers for the JSON-RPC endpoints. When routes or
//! frame formats change, update only this file.

use super::constants::*;
use reqwest::Response;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

pub const SESSION_HEADER: &str = "mcp-session-id";

/// One server-sent event from the streaming endpoint
#[derive(Debug, Clone, Default)]
pub struct SseEvent {
    pub event: String,
    pub id: Option<String>,
    pub data: String,
}

impl SseEvent {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.data).expect("SSE data is not JSON")
    }
}

/// HTTP test client that remembers the session id returned by `initialize`
pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
    /// Session id sent on every call, once initialized
    pub session_id: Option<String>,
    next_id: AtomicI64,
}

impl TestClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self {
            client,
            base_url,
            session_id: None,
            next_id: AtomicI64::new(1),
        }
    }

    /// Creates a client with a session in the `Ready` state
    ///
    /// # Panics
    ///
    /// Panics if the handshake fails (indicates test infrastructure problem).
    pub async fn initialized(base_url: String) -> Self {
        let mut client = Self::new(base_url);
        let response = client.initialize(json!({})).await;
        assert!(
            response.get("error").is_none(),
            "initialize failed: {}",
            response
        );
        let status = client.notify("notifications/initialized", None).await.status();
        assert_eq!(status, reqwest::StatusCode::ACCEPTED);
        client
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn request_frame(&self, method: &str, params: Option<Value>) -> Value {
        let mut frame = json!({"jsonrpc": "2.0", "id": self.next_id(), "method": method});
        if let Some(params) = params {
            frame["params"] = params;
        }
        frame
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let mut request = self.client.post(format!("{}{}", self.base_url, path));
        if let Some(id) = &self.session_id {
            request = request.header(SESSION_HEADER, id);
        }
        request
    }

    // ========================================================================
    // Raw Endpoints
    // ========================================================================

    /// POST /mcp with a raw body and extra headers
    pub async fn post_raw(&self, body: impl Into<reqwest::Body>, headers: &[(&str, &str)]) -> Response {
        let mut request = self
            .post("/mcp")
            .header("content-type", "application/json")
            .body(body);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        request.send().await.expect("POST /mcp failed")
    }

    pub async fn get(&self, path: &str) -> Response {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .expect("GET request failed")
    }

    /// DELETE /mcp for the given session id
    pub async fn delete_session(&self, session_id: Option<&str>) -> Response {
        let mut request = self.client.delete(format!("{}/mcp", self.base_url));
        if let Some(id) = session_id {
            request = request.header(SESSION_HEADER, id);
        }
        request.send().await.expect("DELETE /mcp failed")
    }

    // ========================================================================
    // JSON-RPC
    // ========================================================================

    /// Sends a request and returns the full response
    pub async fn rpc_response(&self, method: &str, params: Option<Value>) -> Response {
        let frame = self.request_frame(method, params);
        self.post_raw(frame.to_string(), &[]).await
    }

    /// Sends a request and returns the decoded reply frame
    pub async fn rpc(&self, method: &str, params: Option<Value>) -> Value {
        self.rpc_response(method, params)
            .await
            .json()
            .await
            .expect("reply is not JSON")
    }

    /// Sends a request with extra headers and returns the decoded reply frame
    pub async fn rpc_with_headers(
        &self,
        method: &str,
        params: Option<Value>,
        headers: &[(&str, &str)],
    ) -> Value {
        let frame = self.request_frame(method, params);
        self.post_raw(frame.to_string(), headers)
            .await
            .json()
            .await
            .expect("reply is not JSON")
    }

    pub async fn notify(&self, method: &str, params: Option<Value>) -> Response {
        let mut frame = json!({"jsonrpc": "2.0", "method": method});
        if let Some(params) = params {
            frame["params"] = params;
        }
        self.post_raw(frame.to_string(), &[]).await
    }

    /// Sends `initialize` and remembers the session id from the reply header
    pub async fn initialize(&mut self, params: Value) -> Value {
        let response = self.rpc_response("initialize", Some(params)).await;
        if let Some(id) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            self.session_id = Some(id.to_string());
        }
        response.json().await.expect("reply is not JSON")
    }

    /// `tools/call` returning the reply frame
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Value {
        self.rpc(
            "tools/call",
            Some(json!({"name": name, "arguments": arguments})),
        )
        .await
    }

    /// `tools/call` returning the structured operation result
    pub async fn call_tool_result(&self, name: &str, arguments: Value) -> Value {
        let reply = self.call_tool(name, arguments).await;
        assert!(reply.get("error").is_none(), "protocol error: {}", reply);
        reply["result"]["structuredContent"].clone()
    }

    // ========================================================================
    // Streaming
    // ========================================================================

    /// POST /mcp/stream and collect every event until the stream ends
    pub async fn stream(&self, method: &str, params: Option<Value>) -> Vec<SseEvent> {
        let frame = self.request_frame(method, params);
        let response = self
            .post("/mcp/stream")
            .header("content-type", "application/json")
            .header("accept", "text/event-stream")
            .body(frame.to_string())
            .send()
            .await
            .expect("POST /mcp/stream failed");
        assert_eq!(response.status(), reqwest::StatusCode::OK);

        let body = response.text().await.expect("Failed to read event stream");
        parse_events(&body)
    }
}

/// Parses an SSE body into events, skipping keep-alive comments
pub fn parse_events(body: &str) -> Vec<SseEvent> {
    let mut events = Vec::new();
    let mut current = SseEvent::default();
    let mut has_fields = false;

    for line in body.lines() {
        if line.is_empty() {
            if has_fields {
                events.push(std::mem::take(&mut current));
                has_fields = false;
            }
            continue;
        }
        if line.starts_with(':') {
            continue;
        }
        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        has_fields = true;
        match field {
            "event" => current.event = value.to_string(),
            "id" => current.id = Some(value.to_string()),
            "data" => {
                if !current.data.is_empty() {
                    current.data.push('\n');
                }
                current.data.push_str(value);
            }
            _ => {}
        }
    }
    if has_fields {
        events.push(current);
    }
    events
}
