//! Fixture catalog for end-to-end tests
//!
//! The catalog is written as an import file and loaded through the same
//! path the binary uses, so every test server also exercises the SQLite
//! store.

use super::constants::*;
use anyhow::Result;
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Writes the fixture catalog file into a fresh temp dir.
/// Returns (temp_dir, catalog_file_path, db_path)
pub fn create_test_catalog() -> Result<(TempDir, PathBuf, PathBuf)> {
    let dir = TempDir::new()?;

    let catalog = json!({
        "nodes": [
            {
                "typeKey": GMAIL_KEY,
                "packageName": "vendor-base",
                "displayName": "Gmail",
                "description": "Read and send messages",
                "category": "communication",
                "documentation": "Connects to a Google mailbox."
            },
            {
                "typeKey": GMAIL_TRIGGER_KEY,
                "packageName": "vendor-base",
                "displayName": "Gmail Trigger",
                "description": "Starts a workflow on new messages",
                "category": "communication",
                "isTrigger": true
            },
            {
                "typeKey": EMAIL_SEND_KEY,
                "packageName": "vendor-base",
                "displayName": EMAIL_SEND_NAME,
                "description": "Send email over SMTP",
                "category": "communication"
            },
            {
                "typeKey": HTTP_REQUEST_KEY,
                "packageName": "vendor-base",
                "displayName": "HTTP Request",
                "description": "Call any HTTP API",
                "category": "development"
            },
            // Rejected on import: no type key.
            {"displayName": "Broken"}
        ],
        "templates": [
            {
                "id": DIGEST_TEMPLATE_ID,
                "name": "Daily Gmail digest",
                "category": "productivity",
                "tags": ["email"],
                "nodeTypes": [GMAIL_KEY],
                "payload": {"nodes": [{"type": GMAIL_KEY}]}
            },
            {
                "id": "tpl-webhook-relay",
                "name": "Webhook relay",
                "category": "development",
                "tags": ["http"],
                "nodeTypes": [HTTP_REQUEST_KEY],
                "payload": {"nodes": [{"type": HTTP_REQUEST_KEY}]}
            }
        ]
    });

    let catalog_file = dir.path().join("catalog.json");
    fs::write(&catalog_file, serde_json::to_vec_pretty(&catalog)?)?;
    let db_path = dir.path().join("catalog.db");

    Ok((dir, catalog_file, db_path))
}
