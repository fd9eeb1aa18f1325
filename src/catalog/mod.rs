//! Catalog of capability descriptors ("nodes") and worked examples
//! ("templates").

mod index;
mod load;
pub mod models;
mod schema;
pub mod search;
mod store;
pub mod validation;

pub use index::{
    CatalogIndex, ChangeSummary, EntryError, Indexed, RefreshMode, SearchHit, SearchPage,
    Snapshot, DEFAULT_INCREMENTAL_THRESHOLD,
};
pub use load::{import_catalog_file, CatalogFile, ImportReport};
pub use models::{
    CatalogEntry, CategoryCount, NodeFilter, NodeSummary, TemplateEntry, TemplateFilter,
    TemplateSummary,
};
pub use search::{MatchText, MatchTier};
pub use store::{SqliteCatalogStore, StoredCatalog};

use crate::error::BridgeResult;
use crate::server::metrics;
use anyhow::Result;
use std::sync::Arc;
use tracing::info;

impl Indexed for CatalogEntry {
    type Filter = NodeFilter;

    const ENTITY: &'static str = "node";
    const KEY_FIELD: &'static str = "typeKey";

    fn key(&self) -> &str {
        &self.type_key
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn category(&self) -> &str {
        &self.category
    }

    fn match_text(&self) -> MatchText {
        let documentation = self.documentation.as_deref().unwrap_or("");
        let operations: Vec<&str> = self.operations.iter().map(|o| o.name.as_str()).collect();
        let operations = operations.join(" ");
        MatchText::new(
            &self.display_name,
            &[&self.description, documentation, &self.type_key, &operations],
        )
    }

    fn matches(&self, filter: &NodeFilter) -> bool {
        fn same(wanted: &Option<String>, actual: &str) -> bool {
            wanted
                .as_deref()
                .map_or(true, |w| w.eq_ignore_ascii_case(actual))
        }
        same(&filter.category, &self.category)
            && same(&filter.package_name, &self.package_name)
            && filter.is_ai_capable.map_or(true, |v| v == self.is_ai_capable)
            && filter.is_trigger.map_or(true, |v| v == self.is_trigger)
            && filter.is_webhook.map_or(true, |v| v == self.is_webhook)
    }

    fn validate(&self) -> Result<(), validation::ValidationError> {
        validation::validate_entry(self)
    }
}

impl Indexed for TemplateEntry {
    type Filter = TemplateFilter;

    const ENTITY: &'static str = "template";
    const KEY_FIELD: &'static str = "id";

    fn key(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> &str {
        &self.category
    }

    fn match_text(&self) -> MatchText {
        let tags: Vec<&str> = self.tags.iter().map(String::as_str).collect();
        let tags = tags.join(" ");
        MatchText::new(&self.name, &[&self.description, &tags])
    }

    fn matches(&self, filter: &TemplateFilter) -> bool {
        let category_ok = filter
            .category
            .as_deref()
            .map_or(true, |c| c.eq_ignore_ascii_case(&self.category));
        let tag_ok = filter
            .tag
            .as_deref()
            .map_or(true, |t| self.tags.iter().any(|tag| tag.eq_ignore_ascii_case(t)));
        category_ok && tag_ok
    }

    fn validate(&self) -> Result<(), validation::ValidationError> {
        validation::validate_template(self)
    }

    fn references(&self) -> &[String] {
        &self.node_types
    }
}

/// Node and template indexes plus their optional on-disk snapshot.
pub struct Catalog {
    nodes: CatalogIndex<CatalogEntry>,
    templates: CatalogIndex<TemplateEntry>,
    store: Option<SqliteCatalogStore>,
}

impl Catalog {
    pub fn new(incremental_threshold: usize) -> Self {
        Self {
            nodes: CatalogIndex::new(incremental_threshold),
            templates: CatalogIndex::new(incremental_threshold),
            store: None,
        }
    }

    /// Attach a store and load whatever it holds.
    pub fn with_store(incremental_threshold: usize, store: SqliteCatalogStore) -> Result<Self> {
        let stored = store.load()?;
        let catalog = Self {
            store: Some(store),
            ..Self::new(incremental_threshold)
        };
        let nodes = catalog.nodes.refresh_raw(stored.nodes);
        let templates = catalog.templates.refresh_raw(stored.templates);
        info!(
            "Loaded catalog from database: {} nodes, {} templates ({} rejected)",
            nodes.added,
            templates.added,
            nodes.errors.len() + templates.errors.len()
        );
        catalog.update_metrics();
        Ok(catalog)
    }

    pub fn store(&self) -> Option<&SqliteCatalogStore> {
        self.store.as_ref()
    }

    pub fn nodes(&self) -> &CatalogIndex<CatalogEntry> {
        &self.nodes
    }

    pub fn templates(&self) -> &CatalogIndex<TemplateEntry> {
        &self.templates
    }

    pub fn get(&self, type_key: &str) -> BridgeResult<Arc<CatalogEntry>> {
        self.nodes.get(type_key)
    }

    pub fn search(
        &self,
        query: &str,
        filter: &NodeFilter,
        limit: Option<usize>,
        offset: usize,
    ) -> BridgeResult<SearchPage<CatalogEntry>> {
        self.nodes.search(query, filter, limit, offset)
    }

    pub fn list_by_category(&self, category: &str) -> Vec<Arc<CatalogEntry>> {
        self.nodes.list_by_category(category)
    }

    pub fn list_nodes(&self, filter: &NodeFilter) -> Vec<Arc<CatalogEntry>> {
        self.nodes.snapshot().list(filter)
    }

    pub fn refresh(&self, entries: Vec<CatalogEntry>) -> ChangeSummary {
        let summary = self.nodes.refresh(entries);
        self.update_metrics();
        summary
    }

    pub fn get_template(&self, id: &str) -> BridgeResult<Arc<TemplateEntry>> {
        self.templates.get(id)
    }

    pub fn search_templates(
        &self,
        query: &str,
        filter: &TemplateFilter,
        limit: Option<usize>,
        offset: usize,
    ) -> BridgeResult<SearchPage<TemplateEntry>> {
        self.templates.search(query, filter, limit, offset)
    }

    pub fn list_templates_by_category(&self, category: &str) -> Vec<Arc<TemplateEntry>> {
        self.templates.list_by_category(category)
    }

    pub fn refresh_templates(&self, templates: Vec<TemplateEntry>) -> ChangeSummary {
        let summary = self.templates.refresh(templates);
        self.update_metrics();
        summary
    }

    /// Templates that use the node `type_key`.
    pub fn templates_for_node(&self, type_key: &str) -> BridgeResult<Vec<Arc<TemplateEntry>>> {
        self.nodes.get(type_key)?;
        Ok(self.templates.snapshot().referencing(type_key))
    }

    /// Node categories with entry counts, alphabetically.
    pub fn categories(&self) -> Vec<CategoryCount> {
        self.nodes
            .snapshot()
            .categories()
            .into_iter()
            .filter(|(name, _)| !name.is_empty())
            .map(|(name, count)| CategoryCount { name, count })
            .collect()
    }

    pub fn counts(&self) -> (usize, usize) {
        (self.nodes.len(), self.templates.len())
    }

    /// Write the current in-memory sets to the attached store, if any.
    pub fn persist(&self) -> Result<bool> {
        let Some(store) = &self.store else {
            return Ok(false);
        };
        if store.is_read_only() {
            return Ok(false);
        }
        let nodes: Vec<CatalogEntry> = self
            .nodes
            .snapshot()
            .list(&NodeFilter::default())
            .iter()
            .map(|e| e.as_ref().clone())
            .collect();
        let templates: Vec<TemplateEntry> = self
            .templates
            .snapshot()
            .list(&TemplateFilter::default())
            .iter()
            .map(|e| e.as_ref().clone())
            .collect();
        store.replace_nodes(&nodes)?;
        store.replace_templates(&templates)?;
        Ok(true)
    }

    fn update_metrics(&self) {
        let (nodes, templates) = self.counts();
        metrics::set_catalog_entries("node", nodes);
        metrics::set_catalog_entries("template", templates);
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new(DEFAULT_INCREMENTAL_THRESHOLD)
    }
}
