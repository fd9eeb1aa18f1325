//! SQLite schema for the persisted catalog snapshot.
//!
//! Entries are stored as JSON bodies keyed by their unique key; the columns
//! next to the body exist only for inspection and partial queries.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP};

const NODES_TABLE: Table = Table {
    name: "nodes",
    columns: &[
        sqlite_column!("type_key", &SqlType::Text, is_primary_key = true),
        sqlite_column!("display_name", &SqlType::Text, non_null = true),
        sqlite_column!("category", &SqlType::Text, non_null = true),
        sqlite_column!("body", &SqlType::Text, non_null = true),
        sqlite_column!(
            "imported_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_nodes_category", "category")],
};

const TEMPLATES_TABLE: Table = Table {
    name: "templates",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("category", &SqlType::Text, non_null = true),
        sqlite_column!("body", &SqlType::Text, non_null = true),
        sqlite_column!(
            "imported_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_templates_category", "category")],
};

/// Key/value pairs describing the snapshot (checksums, source).
const SNAPSHOT_INFO_TABLE: Table = Table {
    name: "snapshot_info",
    columns: &[
        sqlite_column!("key", &SqlType::Text, is_primary_key = true),
        sqlite_column!("value", &SqlType::Text, non_null = true),
    ],
    indices: &[],
};

pub const CATALOG_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[NODES_TABLE, TEMPLATES_TABLE, SNAPSHOT_INFO_TABLE],
    migration: None,
}];
