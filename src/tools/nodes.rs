//! Node Tools
//!
//! Search and read capability descriptors from the catalog.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::catalog::{MatchTier, NodeFilter, NodeSummary};
use crate::dispatcher::{CheckedArgs, Dispatcher, ToolBuilder, ToolContext, ToolDescriptor};
use crate::error::{BridgeError, BridgeResult};

/// Register node tools with the dispatcher
pub fn register_tools(dispatcher: &mut Dispatcher) -> BridgeResult<()> {
    dispatcher.register(search_nodes_tool())?;
    dispatcher.register(get_node_tool())?;
    dispatcher.register(get_node_documentation_tool())?;
    dispatcher.register(list_nodes_tool())?;
    dispatcher.register(list_categories_tool())?;
    Ok(())
}

const DEFAULT_LIST_LIMIT: usize = 100;
const MAX_LIST_LIMIT: usize = 500;

fn filter_properties() -> Value {
    json!({
        "category": {"type": "string", "description": "Only nodes in this category"},
        "packageName": {"type": "string", "description": "Only nodes from this package"},
        "isAiCapable": {"type": "boolean"},
        "isTrigger": {"type": "boolean"},
        "isWebhook": {"type": "boolean"}
    })
}

fn with_filters(mut properties: Value) -> Value {
    if let (Some(target), Some(filters)) = (
        properties.as_object_mut(),
        filter_properties().as_object().cloned(),
    ) {
        target.extend(filters);
    }
    properties
}

// ============================================================================
// search_nodes
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchNodesParams {
    query: String,
    limit: Option<usize>,
    #[serde(default)]
    offset: usize,
    #[serde(flatten)]
    filter: NodeFilter,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RankedNode {
    #[serde(flatten)]
    node: NodeSummary,
    match_tier: MatchTier,
}

fn search_nodes_tool() -> ToolDescriptor {
    ToolBuilder::new("search_nodes")
        .description(
            "Search nodes by name, description and documentation. Exact name matches rank \
             first, then prefix, substring and description matches.",
        )
        .input_schema(json!({
            "type": "object",
            "properties": with_filters(json!({
                "query": {"type": "string", "minLength": 1, "description": "Search text"},
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": 50,
                    "default": 10,
                    "description": "Maximum number of results (default 10)"
                },
                "offset": {"type": "integer", "minimum": 0, "default": 0}
            })),
            "required": ["query"],
            "additionalProperties": false
        }))
        .read_only()
        .build(search_nodes_handler)
}

async fn search_nodes_handler(ctx: ToolContext, args: CheckedArgs) -> BridgeResult<Value> {
    let params: SearchNodesParams = args.parse()?;
    let page = ctx
        .catalog
        .search(&params.query, &params.filter, params.limit, params.offset)?;

    let results: Vec<RankedNode> = page
        .hits
        .iter()
        .map(|hit| RankedNode {
            node: hit.entry.summary(),
            match_tier: hit.tier,
        })
        .collect();

    Ok(json!({
        "query": params.query,
        "total": page.total,
        "offset": page.offset,
        "limit": page.limit,
        "results": results,
    }))
}

// ============================================================================
// get_node
// ============================================================================

fn type_key_schema(extra: Value) -> Value {
    let mut properties = json!({
        "typeKey": {"type": "string", "minLength": 1, "description": "Node type key"}
    });
    if let (Some(target), Some(extra)) = (properties.as_object_mut(), extra.as_object()) {
        target.extend(extra.clone());
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": ["typeKey"],
        "additionalProperties": false
    })
}

fn get_node_tool() -> ToolDescriptor {
    ToolBuilder::new("get_node")
        .description("Get the full descriptor of a node: properties, operations and credentials")
        .input_schema(type_key_schema(json!({
            "includeDocumentation": {"type": "boolean", "default": false}
        })))
        .read_only()
        .build(get_node_handler)
}

async fn get_node_handler(ctx: ToolContext, args: CheckedArgs) -> BridgeResult<Value> {
    let entry = ctx.catalog.get(args.required_str("typeKey")?)?;
    let mut value = serde_json::to_value(entry.as_ref())
        .map_err(|e| BridgeError::validation(format!("unserializable node: {}", e)))?;
    if !args.bool("includeDocumentation").unwrap_or(false) {
        if let Some(object) = value.as_object_mut() {
            object.remove("documentation");
        }
    }
    Ok(value)
}

// ============================================================================
// get_node_documentation
// ============================================================================

fn get_node_documentation_tool() -> ToolDescriptor {
    ToolBuilder::new("get_node_documentation")
        .description("Get the documentation text of a node")
        .input_schema(type_key_schema(json!({})))
        .read_only()
        .build(get_node_documentation_handler)
}

async fn get_node_documentation_handler(
    ctx: ToolContext,
    args: CheckedArgs,
) -> BridgeResult<Value> {
    let type_key = args.required_str("typeKey")?;
    let entry = ctx.catalog.get(type_key)?;
    let documentation = entry
        .documentation
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .ok_or_else(|| BridgeError::not_found("documentation", type_key))?;

    Ok(json!({
        "typeKey": entry.type_key,
        "displayName": entry.display_name,
        "documentation": documentation,
    }))
}

// ============================================================================
// list_nodes
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListNodesParams {
    #[serde(default = "default_list_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
    #[serde(flatten)]
    filter: NodeFilter,
}

fn default_list_limit() -> usize {
    DEFAULT_LIST_LIMIT
}

fn list_nodes_tool() -> ToolDescriptor {
    ToolBuilder::new("list_nodes")
        .description("List nodes alphabetically, optionally filtered by category, package or flags")
        .input_schema(json!({
            "type": "object",
            "properties": with_filters(json!({
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": MAX_LIST_LIMIT,
                    "default": DEFAULT_LIST_LIMIT
                },
                "offset": {"type": "integer", "minimum": 0, "default": 0}
            })),
            "additionalProperties": false
        }))
        .read_only()
        .build(list_nodes_handler)
}

async fn list_nodes_handler(ctx: ToolContext, args: CheckedArgs) -> BridgeResult<Value> {
    let params: ListNodesParams = args.parse()?;
    let nodes = ctx.catalog.list_nodes(&params.filter);
    let total = nodes.len();
    let page: Vec<NodeSummary> = nodes
        .iter()
        .skip(params.offset)
        .take(params.limit)
        .map(|entry| entry.summary())
        .collect();

    Ok(json!({
        "total": total,
        "offset": params.offset,
        "nodes": page,
    }))
}

// ============================================================================
// list_categories
// ============================================================================

fn list_categories_tool() -> ToolDescriptor {
    ToolBuilder::new("list_categories")
        .description("List node categories with the number of nodes in each")
        .read_only()
        .build(list_categories_handler)
}

async fn list_categories_handler(ctx: ToolContext, _args: CheckedArgs) -> BridgeResult<Value> {
    Ok(json!({ "categories": ctx.catalog.categories() }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::{context, dispatcher_with_catalog};
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn test_search_ranks_exact_before_prefix() {
        let dispatcher = dispatcher_with_catalog();
        let result = dispatcher
            .invoke("search_nodes", Some(json!({"query": "gmail"})), context())
            .await;
        assert!(result.success, "{:?}", result.error_detail);
        let data = result.data.unwrap();
        let names: Vec<&str> = data["results"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["displayName"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Gmail", "Gmail Trigger"]);
        assert_eq!(data["results"][0]["matchTier"], "exact");
        assert_eq!(data["results"][1]["matchTier"], "prefix");
    }

    #[tokio::test]
    async fn test_search_filters_and_limits() {
        let dispatcher = dispatcher_with_catalog();
        let result = dispatcher
            .invoke(
                "search_nodes",
                Some(json!({"query": "gmail", "isTrigger": true})),
                context(),
            )
            .await;
        let data = result.data.unwrap();
        assert_eq!(data["total"], 1);
        assert_eq!(data["results"][0]["typeKey"], "vendor.gmailTrigger");

        let too_many = dispatcher
            .invoke("search_nodes", Some(json!({"query": "gmail", "limit": 51})), context())
            .await;
        assert_eq!(too_many.error_kind, Some(ErrorKind::Validation));
    }

    #[tokio::test]
    async fn test_get_node_and_documentation() {
        let dispatcher = dispatcher_with_catalog();
        let node = dispatcher
            .invoke("get_node", Some(json!({"typeKey": "vendor.gmail"})), context())
            .await
            .data
            .unwrap();
        assert_eq!(node["displayName"], "Gmail");
        assert!(node.get("documentation").is_none());

        let docs = dispatcher
            .invoke(
                "get_node_documentation",
                Some(json!({"typeKey": "vendor.gmail"})),
                context(),
            )
            .await
            .data
            .unwrap();
        assert!(docs["documentation"].as_str().unwrap().contains("mailbox"));

        let missing = dispatcher
            .invoke("get_node", Some(json!({"typeKey": "vendor.none"})), context())
            .await;
        assert_eq!(missing.error_kind, Some(ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn test_list_nodes_and_categories() {
        let dispatcher = dispatcher_with_catalog();
        let listed = dispatcher
            .invoke("list_nodes", Some(json!({"category": "communication"})), context())
            .await
            .data
            .unwrap();
        assert_eq!(listed["total"], 3);

        let categories = dispatcher
            .invoke("list_categories", None, context())
            .await
            .data
            .unwrap();
        assert_eq!(categories["categories"][0]["name"], "communication");
        assert_eq!(categories["categories"][0]["count"], 3);
    }
}
