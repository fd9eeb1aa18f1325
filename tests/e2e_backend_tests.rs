//! End-to-end tests for backend-facing tools
//!
//! A mock backend runs in-process; tests assert on what the bridge sent to
//! it and how failures come back through `tools/call`.

mod common;

use common::{
    MockBackend, MockMode, TestClient, TestServer, MOCK_BACKEND_VERSION, MOCK_PAGE_SIZE,
    MOCK_WORKFLOW_COUNT, OVERRIDE_API_KEY, TEST_API_KEY,
};
use serde_json::json;

// ============================================================================
// Retries
// ============================================================================

#[tokio::test]
async fn test_three_unavailable_replies_then_success() {
    let backend = MockBackend::spawn(MockMode::Flaky {
        failures: 3,
        status: 503,
    })
    .await;
    let server = TestServer::spawn_with_backend(Some(&backend.base_url)).await;
    let client = TestClient::initialized(server.base_url.clone()).await;

    let result = client.call_tool_result("list_workflows", json!({})).await;
    assert_eq!(result["success"], true, "{}", result);
    assert_eq!(result["data"]["retries"], 3);
    assert_eq!(result["data"]["count"], MOCK_PAGE_SIZE);
    assert_eq!(backend.workflow_calls(), 4);
}

#[tokio::test]
async fn test_retry_budget_exhausted() {
    let backend = MockBackend::spawn(MockMode::Flaky {
        failures: 10,
        status: 502,
    })
    .await;
    let server = TestServer::spawn_with_backend(Some(&backend.base_url)).await;
    let client = TestClient::initialized(server.base_url.clone()).await;

    let reply = client.call_tool("list_workflows", json!({})).await;
    let result = &reply["result"]["structuredContent"];
    assert_eq!(reply["result"]["isError"], true);
    assert_eq!(result["errorKind"], "BackendError");
    assert_eq!(result["errorDetail"]["code"], "SERVER_ERROR");
    assert_eq!(result["errorDetail"]["status"], 502);
    // One attempt plus three retries.
    assert_eq!(backend.workflow_calls(), 4);
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let backend = MockBackend::spawn(MockMode::NotFound).await;
    let server = TestServer::spawn_with_backend(Some(&backend.base_url)).await;
    let client = TestClient::initialized(server.base_url.clone()).await;

    let reply = client.call_tool("get_workflow", json!({"id": "wf-1"})).await;
    assert_eq!(reply["result"]["isError"], true);
    assert_eq!(
        reply["result"]["structuredContent"]["errorKind"],
        "NotFoundError"
    );
    assert_eq!(backend.workflow_calls(), 1);
}

// ============================================================================
// Context
// ============================================================================

#[tokio::test]
async fn test_fallback_credentials_are_sent() {
    let backend = MockBackend::spawn(MockMode::Healthy).await;
    let server = TestServer::spawn_with_backend(Some(&backend.base_url)).await;
    let client = TestClient::initialized(server.base_url.clone()).await;

    let result = client
        .call_tool_result("get_workflow", json!({"id": "wf-3"}))
        .await;
    assert_eq!(result["data"]["name"], "Workflow 3");
    assert_eq!(backend.last_api_key().as_deref(), Some(TEST_API_KEY));
}

#[tokio::test]
async fn test_version_probe_is_cached_per_backend() {
    let backend = MockBackend::spawn(MockMode::Healthy).await;
    let server = TestServer::spawn_with_backend(Some(&backend.base_url)).await;
    let client = TestClient::initialized(server.base_url.clone()).await;

    for id in ["wf-0", "wf-1", "wf-2"] {
        let result = client.call_tool_result("get_workflow", json!({"id": id})).await;
        assert_eq!(result["success"], true);
    }
    assert_eq!(backend.version_probes(), 1);

    let diagnostics = client
        .call_tool_result("bridge_diagnostics", json!({"probeBackend": true}))
        .await;
    let backend_report = &diagnostics["data"]["backend"];
    assert_eq!(backend_report["cachedVersions"], 1);
    assert_eq!(backend_report["probe"]["ok"], true);
    assert_eq!(backend_report["probe"]["backendVersion"], MOCK_BACKEND_VERSION);
    assert_eq!(backend.version_probes(), 1);
}

#[tokio::test]
async fn test_initialize_headers_select_the_backend() {
    let backend = MockBackend::spawn(MockMode::Healthy).await;
    // The server has no fallback backend at all.
    let server = TestServer::spawn().await;
    let mut client = TestClient::new(server.base_url.clone());

    let reply = client
        .rpc_with_headers(
            "initialize",
            Some(json!({})),
            &[
                ("x-backend-url", backend.base_url.as_str()),
                ("x-backend-api-key", OVERRIDE_API_KEY),
            ],
        )
        .await;
    assert!(reply["result"].is_object(), "{}", reply);
    client.session_id = server.bridge.sessions().current_id();
    client.notify("notifications/initialized", None).await;

    let result = client
        .call_tool_result("get_workflow", json!({"id": "wf-1"}))
        .await;
    assert_eq!(result["success"], true, "{}", result);
    assert_eq!(backend.last_api_key().as_deref(), Some(OVERRIDE_API_KEY));
}

#[tokio::test]
async fn test_session_less_call_uses_override_headers() {
    let backend = MockBackend::spawn(MockMode::Healthy).await;
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let reply = client
        .rpc_with_headers(
            "tools/call",
            Some(json!({"name": "get_workflow", "arguments": {"id": "wf-2"}})),
            &[
                ("x-backend-url", backend.base_url.as_str()),
                ("x-backend-api-key", OVERRIDE_API_KEY),
            ],
        )
        .await;
    assert_eq!(reply["result"]["isError"], false, "{}", reply);
    assert_eq!(backend.workflow_calls(), 1);
}

#[tokio::test]
async fn test_fallback_key_is_not_sent_to_an_override_backend() {
    let fallback = MockBackend::spawn(MockMode::Healthy).await;
    let other = MockBackend::spawn(MockMode::Healthy).await;
    let server = TestServer::spawn_with_backend(Some(&fallback.base_url)).await;
    let client = TestClient::new(server.base_url.clone());

    let reply = client
        .rpc_with_headers(
            "tools/call",
            Some(json!({"name": "get_workflow", "arguments": {"id": "wf-1"}})),
            &[("x-backend-url", other.base_url.as_str())],
        )
        .await;
    assert_eq!(reply["error"]["code"], -32602, "{}", reply);
    assert_eq!(reply["error"]["data"]["errorKind"], "ValidationError");
    assert!(!reply.to_string().contains(TEST_API_KEY));

    assert_eq!(other.version_probes(), 0);
    assert_eq!(other.workflow_calls(), 0);
    assert_eq!(other.last_api_key(), None);
    assert_eq!(fallback.workflow_calls(), 0);
}

#[tokio::test]
async fn test_backend_tool_without_backend_is_a_validation_error() {
    let server = TestServer::spawn().await;
    let client = TestClient::initialized(server.base_url.clone()).await;

    let reply = client.call_tool("list_workflows", json!({})).await;
    assert_eq!(reply["result"]["isError"], true);
    assert_eq!(
        reply["result"]["structuredContent"]["errorKind"],
        "ValidationError"
    );
}

#[tokio::test]
async fn test_fetch_all_walks_every_page() {
    let backend = MockBackend::spawn(MockMode::Healthy).await;
    let server = TestServer::spawn_with_backend(Some(&backend.base_url)).await;
    let client = TestClient::initialized(server.base_url.clone()).await;

    let result = client
        .call_tool_result("list_workflows", json!({"fetchAll": true}))
        .await;
    assert_eq!(result["data"]["count"], MOCK_WORKFLOW_COUNT);
    assert_eq!(result["data"]["truncated"], false);
    assert_eq!(backend.workflow_calls(), 3);
}
