//! Catalog data models.
//!
//! Wire names are camelCase, matching the JSON catalogs the bridge imports and
//! the payloads it returns to clients.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

// =============================================================================
// Nodes
// =============================================================================

/// One configurable field of a node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDescriptor {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(rename = "type", default = "default_property_type")]
    pub property_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<Value>,
}

fn default_property_type() -> String {
    "string".to_string()
}

/// A named sub-action of a node, e.g. `message/send`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationDescriptor {
    #[serde(default)]
    pub resource: String,
    pub name: String,
    #[serde(default)]
    pub action: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRequirement {
    pub name: String,
    #[serde(default)]
    pub required: bool,
}

/// Capability descriptor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    /// Unique key, e.g. `"vendor.capabilityName"`.
    pub type_key: String,
    #[serde(default)]
    pub package_name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub is_ai_capable: bool,
    #[serde(default)]
    pub is_trigger: bool,
    #[serde(default)]
    pub is_webhook: bool,
    #[serde(default)]
    pub properties_schema: Vec<PropertyDescriptor>,
    #[serde(default)]
    pub operations: Vec<OperationDescriptor>,
    #[serde(default)]
    pub credentials_required: Vec<CredentialRequirement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    "1".to_string()
}

impl CatalogEntry {
    /// Compact representation used in search results and listings.
    pub fn summary(&self) -> NodeSummary {
        NodeSummary {
            type_key: self.type_key.clone(),
            display_name: self.display_name.clone(),
            description: self.description.clone(),
            category: self.category.clone(),
            package_name: self.package_name.clone(),
            is_trigger: self.is_trigger,
            is_ai_capable: self.is_ai_capable,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSummary {
    pub type_key: String,
    pub display_name: String,
    pub description: String,
    pub category: String,
    pub package_name: String,
    pub is_trigger: bool,
    pub is_ai_capable: bool,
}

/// Conjunctive attribute filter over nodes. `None` means "any".
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeFilter {
    pub category: Option<String>,
    pub package_name: Option<String>,
    pub is_ai_capable: Option<bool>,
    pub is_trigger: Option<bool>,
    pub is_webhook: Option<bool>,
}

// =============================================================================
// Templates
// =============================================================================

/// Worked example built from one or more nodes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub node_types: Vec<String>,
    #[serde(default)]
    pub payload: Value,
}

impl TemplateEntry {
    pub fn summary(&self) -> TemplateSummary {
        TemplateSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            category: self.category.clone(),
            tags: self.tags.iter().cloned().collect(),
            node_types: self.node_types.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub tags: Vec<String>,
    pub node_types: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TemplateFilter {
    pub category: Option<String>,
    pub tag: Option<String>,
}

/// Category name with the number of entries in it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub name: String,
    pub count: usize,
}
