//! Common test infrastructure
//!
//! This module provides all the infrastructure needed for end-to-end tests.
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestServer, TestClient, GMAIL_KEY};
//! use serde_json::json;
//!
//! #[tokio::test]
//! async fn test_get_node() {
//!     let server = TestServer::spawn().await;
//!     let client = TestClient::initialized(server.base_url.clone()).await;
//!
//!     let result = client.call_tool_result("get_node", json!({"typeKey": GMAIL_KEY})).await;
//!     assert_eq!(result["success"], true);
//! }
//! ```

mod client;
mod constants;
mod fixtures;
mod mock_backend;
mod server;

// Public API - this is what tests import
#[allow(unused_imports)]
pub use client::{parse_events, SseEvent, TestClient, SESSION_HEADER};
pub use constants::*;
#[allow(unused_imports)]
pub use mock_backend::{MockBackend, MockMode};
pub use server::TestServer;
