//! SQLite-backed persistence for the catalog snapshot.
//!
//! The store never serves queries; it only holds the last imported entry sets
//! so that a restart can rebuild the in-memory index without re-importing.

use super::models::{CatalogEntry, TemplateEntry};
use super::schema::CATALOG_VERSIONED_SCHEMAS;
use crate::sqlite_persistence::migrate_if_needed;
use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use tracing::info;

const NODES_CHECKSUM_KEY: &str = "nodes_checksum";
const TEMPLATES_CHECKSUM_KEY: &str = "templates_checksum";

pub struct SqliteCatalogStore {
    conn: Mutex<Connection>,
    read_only: bool,
}

/// Raw entry sets as stored, before decoding.
#[derive(Debug, Default)]
pub struct StoredCatalog {
    pub nodes: Vec<Value>,
    pub templates: Vec<Value>,
}

impl SqliteCatalogStore {
    /// Open (creating if needed) a writable store at `db_path`.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let mut conn = Connection::open_with_flags(
            db_path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("Failed to open catalog database {:?}", db_path.as_ref()))?;

        migrate_if_needed(&mut conn, CATALOG_VERSIONED_SCHEMAS)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let store = Self {
            conn: Mutex::new(conn),
            read_only: false,
        };
        let (nodes, templates) = store.counts()?;
        info!(
            "Catalog database {:?} has {} nodes and {} templates",
            db_path.as_ref(),
            nodes,
            templates
        );
        Ok(store)
    }

    /// Open an existing store without write access.
    pub fn open_read_only<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open_with_flags(
            db_path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("Failed to open catalog database {:?}", db_path.as_ref()))?;

        let schema = CATALOG_VERSIONED_SCHEMAS
            .last()
            .context("No catalog schema defined")?;
        schema
            .validate(&conn)
            .context("Catalog database schema does not match")?;

        Ok(Self {
            conn: Mutex::new(conn),
            read_only: true,
        })
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn counts(&self) -> Result<(usize, usize)> {
        let conn = self.conn();
        let nodes: i64 = conn.query_row("SELECT COUNT(*) FROM nodes", [], |r| r.get(0))?;
        let templates: i64 = conn.query_row("SELECT COUNT(*) FROM templates", [], |r| r.get(0))?;
        Ok((nodes as usize, templates as usize))
    }

    /// Replace every stored node in one transaction.
    pub fn replace_nodes(&self, nodes: &[CatalogEntry]) -> Result<()> {
        if self.read_only {
            bail!("Catalog database was opened read-only");
        }
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM nodes", [])?;
        let mut bodies = Vec::with_capacity(nodes.len());
        {
            let mut stmt = tx.prepare(
                "INSERT INTO nodes (type_key, display_name, category, body) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for node in nodes {
                let body = serde_json::to_string(node)?;
                stmt.execute(params![
                    node.type_key,
                    node.display_name,
                    node.category,
                    body
                ])
                .with_context(|| format!("Failed to store node {}", node.type_key))?;
                bodies.push(body);
            }
        }
        set_info(&tx, NODES_CHECKSUM_KEY, &checksum(&mut bodies))?;
        tx.commit()?;
        Ok(())
    }

    /// Replace every stored template in one transaction.
    pub fn replace_templates(&self, templates: &[TemplateEntry]) -> Result<()> {
        if self.read_only {
            bail!("Catalog database was opened read-only");
        }
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM templates", [])?;
        let mut bodies = Vec::with_capacity(templates.len());
        {
            let mut stmt = tx.prepare(
                "INSERT INTO templates (id, name, category, body) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for template in templates {
                let body = serde_json::to_string(template)?;
                stmt.execute(params![template.id, template.name, template.category, body])
                    .with_context(|| format!("Failed to store template {}", template.id))?;
                bodies.push(body);
            }
        }
        set_info(&tx, TEMPLATES_CHECKSUM_KEY, &checksum(&mut bodies))?;
        tx.commit()?;
        Ok(())
    }

    /// Load both entry sets as raw JSON. Bodies that are not valid JSON are
    /// passed through as strings so the index reports them as undecodable.
    pub fn load(&self) -> Result<StoredCatalog> {
        let conn = self.conn();
        Ok(StoredCatalog {
            nodes: load_bodies(&conn, "SELECT body FROM nodes ORDER BY type_key")?,
            templates: load_bodies(&conn, "SELECT body FROM templates ORDER BY id")?,
        })
    }

    pub fn nodes_checksum(&self) -> Result<Option<String>> {
        get_info(&self.conn(), NODES_CHECKSUM_KEY)
    }

    pub fn templates_checksum(&self) -> Result<Option<String>> {
        get_info(&self.conn(), TEMPLATES_CHECKSUM_KEY)
    }
}

fn load_bodies(conn: &Connection, sql: &str) -> Result<Vec<Value>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    let mut values = Vec::new();
    for body in rows {
        let body = body?;
        let value = match serde_json::from_str::<Value>(&body) {
            Ok(value) => value,
            Err(_) => Value::String(body),
        };
        values.push(value);
    }
    Ok(values)
}

/// Order-independent digest of a set of JSON bodies.
fn checksum(bodies: &mut [String]) -> String {
    bodies.sort();
    let mut hasher = Sha256::new();
    for body in bodies.iter() {
        hasher.update(body.as_bytes());
        hasher.update([0u8]);
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn set_info(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO snapshot_info (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

fn get_info(conn: &Connection, key: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT value FROM snapshot_info WHERE key = ?1",
            params![key],
            |r| r.get(0),
        )
        .optional()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn node(key: &str, name: &str) -> CatalogEntry {
        serde_json::from_value(json!({
            "typeKey": key,
            "displayName": name,
            "category": "core"
        }))
        .unwrap()
    }

    fn template(id: &str) -> TemplateEntry {
        serde_json::from_value(json!({
            "id": id,
            "name": format!("Template {}", id),
            "nodeTypes": ["v.a"]
        }))
        .unwrap()
    }

    #[test]
    fn test_replace_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = SqliteCatalogStore::open(dir.path().join("catalog.db")).unwrap();

        store.replace_nodes(&[node("v.a", "A"), node("v.b", "B")]).unwrap();
        store.replace_templates(&[template("t1")]).unwrap();
        assert_eq!(store.counts().unwrap(), (2, 1));

        store.replace_nodes(&[node("v.c", "C")]).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.nodes.len(), 1);
        assert_eq!(loaded.nodes[0]["typeKey"], "v.c");
        assert_eq!(loaded.templates[0]["id"], "t1");
    }

    #[test]
    fn test_checksum_ignores_order() {
        let dir = TempDir::new().unwrap();
        let store = SqliteCatalogStore::open(dir.path().join("catalog.db")).unwrap();

        assert!(store.nodes_checksum().unwrap().is_none());
        store.replace_nodes(&[node("v.a", "A"), node("v.b", "B")]).unwrap();
        let first = store.nodes_checksum().unwrap().unwrap();
        store.replace_nodes(&[node("v.b", "B"), node("v.a", "A")]).unwrap();
        assert_eq!(store.nodes_checksum().unwrap().unwrap(), first);
        store.replace_nodes(&[node("v.a", "A")]).unwrap();
        assert_ne!(store.nodes_checksum().unwrap().unwrap(), first);
    }

    #[test]
    fn test_read_only_store_refuses_writes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("catalog.db");
        {
            let store = SqliteCatalogStore::open(&path).unwrap();
            store.replace_nodes(&[node("v.a", "A")]).unwrap();
        }

        let store = SqliteCatalogStore::open_read_only(&path).unwrap();
        assert!(store.is_read_only());
        assert_eq!(store.load().unwrap().nodes.len(), 1);
        assert!(store.replace_nodes(&[]).is_err());
    }

    #[test]
    fn test_read_only_open_of_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        assert!(SqliteCatalogStore::open_read_only(dir.path().join("nope.db")).is_err());
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("catalog.db");
        SqliteCatalogStore::open(&path)
            .unwrap()
            .replace_nodes(&[node("v.a", "A")])
            .unwrap();
        let store = SqliteCatalogStore::open(&path).unwrap();
        assert_eq!(store.counts().unwrap(), (1, 0));
    }
}
