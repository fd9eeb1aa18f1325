//! Catalog import from a JSON file of the form
//! `{"nodes": [...], "templates": [...]}`.

use super::{Catalog, ChangeSummary};
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use tracing::{info, warn};

/// On-disk import format. Entries stay raw so that each one can be rejected
/// on its own.
#[derive(Debug, Default, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub nodes: Vec<Value>,
    #[serde(default)]
    pub templates: Vec<Value>,
}

impl CatalogFile {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read catalog file {:?}", path.as_ref()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Catalog file {:?} is not valid JSON", path.as_ref()))
    }
}

#[derive(Debug)]
pub struct ImportReport {
    pub nodes: ChangeSummary,
    pub templates: ChangeSummary,
    pub persisted: bool,
}

/// Apply a catalog file to `catalog`, then write the result through to the
/// attached store.
pub fn import_catalog_file<P: AsRef<Path>>(catalog: &Catalog, path: P) -> Result<ImportReport> {
    let file = CatalogFile::read(&path)?;
    info!(
        "Importing {} nodes and {} templates from {:?}",
        file.nodes.len(),
        file.templates.len(),
        path.as_ref()
    );

    let nodes = catalog.nodes().refresh_raw(file.nodes);
    let templates = catalog.templates().refresh_raw(file.templates);
    for error in nodes.errors.iter().chain(templates.errors.iter()) {
        warn!(
            "Import rejected {}: {}",
            error.key.as_deref().unwrap_or("<unknown>"),
            error.message
        );
    }

    let persisted = catalog.persist()?;
    let (node_count, template_count) = catalog.counts();
    crate::server::metrics::set_catalog_entries("node", node_count);
    crate::server::metrics::set_catalog_entries("template", template_count);

    Ok(ImportReport {
        nodes,
        templates,
        persisted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SqliteCatalogStore;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_import_reports_bad_entries_and_persists() {
        let dir = TempDir::new().unwrap();
        let file_path = dir.path().join("catalog.json");
        std::fs::write(
            &file_path,
            json!({
                "nodes": [
                    {"typeKey": "v.email", "displayName": "Email Sender", "category": "Communication"},
                    {"typeKey": "v.broken"},
                ],
                "templates": [
                    {"id": "t1", "name": "Send report", "nodeTypes": ["v.email"]}
                ]
            })
            .to_string(),
        )
        .unwrap();

        let store = SqliteCatalogStore::open(dir.path().join("catalog.db")).unwrap();
        let catalog = Catalog::with_store(100, store).unwrap();
        let report = import_catalog_file(&catalog, &file_path).unwrap();

        assert_eq!(report.nodes.added, 1);
        assert_eq!(report.nodes.errors.len(), 1);
        assert_eq!(report.nodes.errors[0].key.as_deref(), Some("v.broken"));
        assert_eq!(report.templates.added, 1);
        assert!(report.persisted);
        assert_eq!(catalog.store().unwrap().counts().unwrap(), (1, 1));
    }

    #[test]
    fn test_missing_sections_default_to_empty() {
        let file: CatalogFile = serde_json::from_value(json!({"nodes": []})).unwrap();
        assert!(file.templates.is_empty());
    }

    #[test]
    fn test_unreadable_file_is_an_error() {
        let catalog = Catalog::default();
        assert!(import_catalog_file(&catalog, "/nonexistent/catalog.json").is_err());
    }
}
