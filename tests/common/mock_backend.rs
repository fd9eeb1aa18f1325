//! In-process workflow backend for end-to-end tests
//!
//! Serves the version probe, the health endpoint and a paginated workflow
//! listing. Every request is counted so tests can assert on retries.

use super::constants::*;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

/// How the workflow routes answer
#[derive(Debug, Clone, Copy)]
pub enum MockMode {
    /// Every call succeeds
    Healthy,
    /// The first `failures` workflow calls answer `status`, the rest succeed
    Flaky { failures: usize, status: u16 },
    /// Every workflow call answers 404
    NotFound,
}

#[derive(Default)]
struct Counters {
    probes: AtomicUsize,
    workflow_calls: AtomicUsize,
    last_api_key: Mutex<Option<String>>,
}

#[derive(Clone)]
struct MockState {
    mode: MockMode,
    counters: Arc<Counters>,
}

/// A running mock backend. Stops when the test runtime ends.
pub struct MockBackend {
    pub base_url: String,
    counters: Arc<Counters>,
}

impl MockBackend {
    pub async fn spawn(mode: MockMode) -> Self {
        let counters = Arc::new(Counters::default());
        let state = MockState {
            mode,
            counters: counters.clone(),
        };

        let app = Router::new()
            .route("/api/v1/version", get(version))
            .route("/healthz", get(|| async { Json(json!({"status": "ok"})) }))
            .route("/api/v1/workflows", get(list_workflows))
            .route("/api/v1/workflows/{id}", get(get_workflow))
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock backend");
        let port = listener
            .local_addr()
            .expect("Failed to get mock backend address")
            .port();

        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Mock backend failed");
        });

        Self {
            base_url: format!("http://127.0.0.1:{}", port),
            counters,
        }
    }

    /// Workflow route hits, retries included
    pub fn workflow_calls(&self) -> usize {
        self.counters.workflow_calls.load(Ordering::SeqCst)
    }

    pub fn version_probes(&self) -> usize {
        self.counters.probes.load(Ordering::SeqCst)
    }

    /// API key carried by the most recent workflow call
    pub fn last_api_key(&self) -> Option<String> {
        self.counters
            .last_api_key
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

async fn version(State(state): State<MockState>) -> Json<serde_json::Value> {
    state.counters.probes.fetch_add(1, Ordering::SeqCst);
    Json(json!({"version": MOCK_BACKEND_VERSION}))
}

/// Counts the call and returns the failure reply for the current mode, if any.
fn record_call(state: &MockState, headers: &HeaderMap) -> Option<Response> {
    let n = state.counters.workflow_calls.fetch_add(1, Ordering::SeqCst);
    *state
        .counters
        .last_api_key
        .lock()
        .unwrap_or_else(|e| e.into_inner()) = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    match state.mode {
        MockMode::Healthy => None,
        MockMode::Flaky { failures, status } if n < failures => Some(
            (
                StatusCode::from_u16(status).unwrap_or(StatusCode::SERVICE_UNAVAILABLE),
                Json(json!({"message": "try again later"})),
            )
                .into_response(),
        ),
        MockMode::Flaky { .. } => None,
        MockMode::NotFound => Some(
            (
                StatusCode::NOT_FOUND,
                Json(json!({"message": "no such workflow"})),
            )
                .into_response(),
        ),
    }
}

fn workflow(index: usize) -> serde_json::Value {
    json!({
        "id": format!("wf-{}", index),
        "name": format!("Workflow {}", index),
        "active": index % 2 == 0,
    })
}

async fn list_workflows(
    State(state): State<MockState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if let Some(failure) = record_call(&state, &headers) {
        return failure;
    }

    let start: usize = query
        .get("cursor")
        .and_then(|c| c.parse().ok())
        .unwrap_or(0);
    let end = (start + MOCK_PAGE_SIZE).min(MOCK_WORKFLOW_COUNT);
    let data: Vec<_> = (start..end).map(workflow).collect();
    let next_cursor = (end < MOCK_WORKFLOW_COUNT).then(|| end.to_string());

    Json(json!({"data": data, "nextCursor": next_cursor})).into_response()
}

async fn get_workflow(
    State(state): State<MockState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if let Some(failure) = record_call(&state, &headers) {
        return failure;
    }
    match id.strip_prefix("wf-").and_then(|n| n.parse::<usize>().ok()) {
        Some(n) if n < MOCK_WORKFLOW_COUNT => Json(workflow(n)).into_response(),
        _ => (
            StatusCode::NOT_FOUND,
            Json(json!({"message": "no such workflow"})),
        )
            .into_response(),
    }
}
