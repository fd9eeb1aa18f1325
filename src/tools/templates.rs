//! Template Tools
//!
//! Search and read worked examples.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::catalog::{TemplateFilter, TemplateSummary};
use crate::dispatcher::{CheckedArgs, Dispatcher, ToolBuilder, ToolContext, ToolDescriptor};
use crate::error::{BridgeError, BridgeResult};

/// Register template tools with the dispatcher
pub fn register_tools(dispatcher: &mut Dispatcher) -> BridgeResult<()> {
    dispatcher.register(search_templates_tool())?;
    dispatcher.register(get_template_tool())?;
    dispatcher.register(list_node_templates_tool())?;
    Ok(())
}

// ============================================================================
// search_templates
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchTemplatesParams {
    query: String,
    limit: Option<usize>,
    #[serde(default)]
    offset: usize,
    #[serde(flatten)]
    filter: TemplateFilter,
}

fn search_templates_tool() -> ToolDescriptor {
    ToolBuilder::new("search_templates")
        .description("Search workflow templates by name and description, optionally by category or tag")
        .input_schema(json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "minLength": 1},
                "category": {"type": "string"},
                "tag": {"type": "string"},
                "limit": {"type": "integer", "minimum": 1, "maximum": 50, "default": 10},
                "offset": {"type": "integer", "minimum": 0, "default": 0}
            },
            "required": ["query"],
            "additionalProperties": false
        }))
        .read_only()
        .build(search_templates_handler)
}

async fn search_templates_handler(ctx: ToolContext, args: CheckedArgs) -> BridgeResult<Value> {
    let params: SearchTemplatesParams = args.parse()?;
    let page = ctx.catalog.search_templates(
        &params.query,
        &params.filter,
        params.limit,
        params.offset,
    )?;
    let results: Vec<TemplateSummary> = page.hits.iter().map(|h| h.entry.summary()).collect();

    Ok(json!({
        "query": params.query,
        "total": page.total,
        "offset": page.offset,
        "limit": page.limit,
        "results": results,
    }))
}

// ============================================================================
// get_template
// ============================================================================

fn get_template_tool() -> ToolDescriptor {
    ToolBuilder::new("get_template")
        .description("Get a template including its workflow payload")
        .input_schema(json!({
            "type": "object",
            "properties": {
                "id": {"type": "string", "minLength": 1}
            },
            "required": ["id"],
            "additionalProperties": false
        }))
        .read_only()
        .build(get_template_handler)
}

async fn get_template_handler(ctx: ToolContext, args: CheckedArgs) -> BridgeResult<Value> {
    let template = ctx.catalog.get_template(args.required_str("id")?)?;
    serde_json::to_value(template.as_ref())
        .map_err(|e| BridgeError::validation(format!("unserializable template: {}", e)))
}

// ============================================================================
// list_node_templates
// ============================================================================

fn list_node_templates_tool() -> ToolDescriptor {
    ToolBuilder::new("list_node_templates")
        .description("List templates that use a given node")
        .input_schema(json!({
            "type": "object",
            "properties": {
                "typeKey": {"type": "string", "minLength": 1},
                "limit": {"type": "integer", "minimum": 1, "maximum": 50, "default": 10}
            },
            "required": ["typeKey"],
            "additionalProperties": false
        }))
        .read_only()
        .build(list_node_templates_handler)
}

async fn list_node_templates_handler(ctx: ToolContext, args: CheckedArgs) -> BridgeResult<Value> {
    let type_key = args.required_str("typeKey")?;
    let limit = args.u64("limit").unwrap_or(10) as usize;
    let templates = ctx.catalog.templates_for_node(type_key)?;
    let total = templates.len();
    let results: Vec<TemplateSummary> = templates
        .iter()
        .take(limit)
        .map(|t| t.summary())
        .collect();

    Ok(json!({
        "typeKey": type_key,
        "total": total,
        "templates": results,
    }))
}
