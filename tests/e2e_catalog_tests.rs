//! End-to-end tests for the catalog tools
//!
//! Tests cover search ranking, lookups, listings and how tool failures are
//! reported through `tools/call`.

mod common;

use common::{
    TestClient, TestServer, DIGEST_TEMPLATE_ID, EMAIL_SEND_KEY, EMAIL_SEND_NAME,
    FIXTURE_NODE_COUNT, FIXTURE_TEMPLATE_COUNT, GMAIL_KEY, GMAIL_TRIGGER_KEY,
};
use serde_json::{json, Value};

fn names(results: &Value, field: &str) -> Vec<String> {
    results
        .as_array()
        .expect("not an array")
        .iter()
        .map(|r| r[field].as_str().unwrap_or_default().to_string())
        .collect()
}

// ============================================================================
// Import
// ============================================================================

#[tokio::test]
async fn test_fixture_catalog_imported_and_persisted() {
    let server = TestServer::spawn().await;
    let catalog = server.bridge.catalog();

    assert_eq!(
        catalog.counts(),
        (FIXTURE_NODE_COUNT, FIXTURE_TEMPLATE_COUNT)
    );
    let store = catalog.store().expect("no store attached");
    assert_eq!(
        store.counts().unwrap(),
        (FIXTURE_NODE_COUNT, FIXTURE_TEMPLATE_COUNT)
    );
}

// ============================================================================
// Search
// ============================================================================

#[tokio::test]
async fn test_search_ranks_exact_name_first() {
    let server = TestServer::spawn().await;
    let client = TestClient::initialized(server.base_url.clone()).await;

    let result = client
        .call_tool_result("search_nodes", json!({"query": "Gmail"}))
        .await;
    assert_eq!(result["success"], true);
    assert_eq!(
        names(&result["data"]["results"], "displayName"),
        vec!["Gmail", "Gmail Trigger"]
    );
    assert_eq!(result["data"]["total"], 2);
}

#[tokio::test]
async fn test_search_with_trigger_filter() {
    let server = TestServer::spawn().await;
    let client = TestClient::initialized(server.base_url.clone()).await;

    let result = client
        .call_tool_result("search_nodes", json!({"query": "gmail", "isTrigger": true}))
        .await;
    assert_eq!(
        names(&result["data"]["results"], "typeKey"),
        vec![GMAIL_TRIGGER_KEY]
    );
}

#[tokio::test]
async fn test_search_limit_above_maximum_is_a_validation_error() {
    let server = TestServer::spawn().await;
    let client = TestClient::initialized(server.base_url.clone()).await;

    let reply = client
        .call_tool("search_nodes", json!({"query": "gmail", "limit": 51}))
        .await;
    assert!(reply.get("error").is_none(), "{}", reply);
    assert_eq!(reply["result"]["isError"], true);
    assert_eq!(
        reply["result"]["structuredContent"]["errorKind"],
        "ValidationError"
    );
}

#[tokio::test]
async fn test_search_templates() {
    let server = TestServer::spawn().await;
    let client = TestClient::initialized(server.base_url.clone()).await;

    let result = client
        .call_tool_result("search_templates", json!({"query": "digest"}))
        .await;
    assert_eq!(result["success"], true);
    assert_eq!(result["data"]["results"][0]["id"], DIGEST_TEMPLATE_ID);
}

// ============================================================================
// Lookups
// ============================================================================

#[tokio::test]
async fn test_get_node_by_type_key() {
    let server = TestServer::spawn().await;
    let client = TestClient::initialized(server.base_url.clone()).await;

    let result = client
        .call_tool_result("get_node", json!({"typeKey": EMAIL_SEND_KEY}))
        .await;
    assert_eq!(result["success"], true);
    assert_eq!(result["data"]["typeKey"], EMAIL_SEND_KEY);
    assert_eq!(result["data"]["displayName"], EMAIL_SEND_NAME);
}

#[tokio::test]
async fn test_get_unknown_node_is_not_found() {
    let server = TestServer::spawn().await;
    let client = TestClient::initialized(server.base_url.clone()).await;

    let reply = client
        .call_tool("get_node", json!({"typeKey": "vendor.nothing"}))
        .await;
    assert_eq!(reply["result"]["isError"], true);
    assert_eq!(
        reply["result"]["structuredContent"]["errorKind"],
        "NotFoundError"
    );
    let text = reply["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.starts_with("NotFoundError"));
}

#[tokio::test]
async fn test_node_documentation() {
    let server = TestServer::spawn().await;
    let client = TestClient::initialized(server.base_url.clone()).await;

    let result = client
        .call_tool_result("get_node_documentation", json!({"typeKey": GMAIL_KEY}))
        .await;
    assert!(result["data"]["documentation"]
        .as_str()
        .unwrap()
        .contains("mailbox"));
}

#[tokio::test]
async fn test_templates_for_node() {
    let server = TestServer::spawn().await;
    let client = TestClient::initialized(server.base_url.clone()).await;

    let result = client
        .call_tool_result("list_node_templates", json!({"typeKey": GMAIL_KEY}))
        .await;
    assert_eq!(result["data"]["total"], 1);
    assert_eq!(result["data"]["templates"][0]["id"], DIGEST_TEMPLATE_ID);
}

// ============================================================================
// Listings
// ============================================================================

#[tokio::test]
async fn test_list_categories() {
    let server = TestServer::spawn().await;
    let client = TestClient::initialized(server.base_url.clone()).await;

    let result = client.call_tool_result("list_categories", json!({})).await;
    let categories = result["data"]["categories"].as_array().unwrap();
    let communication = categories
        .iter()
        .find(|c| c["name"] == "communication")
        .expect("communication category missing");
    assert_eq!(communication["count"], 3);
}

#[tokio::test]
async fn test_list_nodes_by_category() {
    let server = TestServer::spawn().await;
    let client = TestClient::initialized(server.base_url.clone()).await;

    let result = client
        .call_tool_result("list_nodes", json!({"category": "development"}))
        .await;
    assert_eq!(result["data"]["total"], 1);
    assert_eq!(result["data"]["nodes"][0]["displayName"], "HTTP Request");
}

// ============================================================================
// Protocol errors
// ============================================================================

#[tokio::test]
async fn test_tools_list_describes_every_tool() {
    let server = TestServer::spawn().await;
    let client = TestClient::initialized(server.base_url.clone()).await;

    let reply = client.rpc("tools/list", None).await;
    let tools = reply["result"]["tools"].as_array().unwrap();
    let tool_names = names(&reply["result"]["tools"], "name");
    for expected in ["search_nodes", "get_node", "list_workflows", "backend_health"] {
        assert!(tool_names.iter().any(|n| n == expected), "{} missing", expected);
    }
    for tool in tools {
        assert_eq!(tool["inputSchema"]["type"], "object", "{}", tool["name"]);
    }
}

#[tokio::test]
async fn test_unknown_tool_is_invalid_params() {
    let server = TestServer::spawn().await;
    let client = TestClient::initialized(server.base_url.clone()).await;

    let reply = client.call_tool("launch_rockets", json!({})).await;
    assert_eq!(reply["error"]["code"], -32602);
}

#[tokio::test]
async fn test_unknown_method_and_malformed_frames() {
    let server = TestServer::spawn().await;
    let client = TestClient::initialized(server.base_url.clone()).await;

    let reply = client.rpc("resources/list", None).await;
    assert_eq!(reply["error"]["code"], -32601);

    let response = client.post_raw("{not json", &[]).await;
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let reply: Value = response.json().await.unwrap();
    assert_eq!(reply["error"]["code"], -32700);
    assert_eq!(reply["id"], Value::Null);
}
