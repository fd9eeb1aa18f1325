//! Workflow Tools
//!
//! Thin wrappers over the backend's workflow and execution endpoints. Every
//! tool here needs a configured backend.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::backend::{BackendResponse, ExecutionQuery, WorkflowQuery};
use crate::dispatcher::{CheckedArgs, Dispatcher, ToolBuilder, ToolContext, ToolDescriptor};
use crate::error::BridgeResult;

/// Register workflow and execution tools with the dispatcher
pub fn register_tools(dispatcher: &mut Dispatcher) -> BridgeResult<()> {
    dispatcher.register(backend_health_tool())?;
    dispatcher.register(list_workflows_tool())?;
    dispatcher.register(get_workflow_tool())?;
    dispatcher.register(create_workflow_tool())?;
    dispatcher.register(update_workflow_tool())?;
    dispatcher.register(delete_workflow_tool())?;
    dispatcher.register(set_workflow_active_tool())?;
    dispatcher.register(list_executions_tool())?;
    dispatcher.register(get_execution_tool())?;
    dispatcher.register(delete_execution_tool())?;
    Ok(())
}

const DEFAULT_MAX_PAGES: u64 = 20;

fn id_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "id": {"type": "string", "minLength": 1, "description": description}
        },
        "required": ["id"],
        "additionalProperties": false
    })
}

fn body_of(response: BackendResponse) -> Value {
    response.body
}

// ============================================================================
// backend_health
// ============================================================================

fn backend_health_tool() -> ToolDescriptor {
    ToolBuilder::new("backend_health")
        .description("Check that the configured backend is reachable and report its version")
        .read_only()
        .requires_backend()
        .build(backend_health_handler)
}

async fn backend_health_handler(ctx: ToolContext, _args: CheckedArgs) -> BridgeResult<Value> {
    let base_url = ctx.require_backend()?.to_string();
    let response = ctx.backend.health_check(&ctx.context).await?;
    Ok(json!({
        "ok": true,
        "baseUrl": base_url,
        "status": response.status,
        "backendVersion": response.version,
        "retries": response.retries,
        "response": response.body,
    }))
}

// ============================================================================
// list_workflows
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListWorkflowsParams {
    #[serde(flatten)]
    query: WorkflowQuery,
    #[serde(default)]
    fetch_all: bool,
    #[serde(default = "default_max_pages")]
    max_pages: u64,
}

fn default_max_pages() -> u64 {
    DEFAULT_MAX_PAGES
}

fn list_workflows_tool() -> ToolDescriptor {
    ToolBuilder::new("list_workflows")
        .description(
            "List workflows. With fetchAll, follows pagination cursors and reports progress \
             per page.",
        )
        .input_schema(json!({
            "type": "object",
            "properties": {
                "limit": {"type": "integer", "minimum": 1, "maximum": 250},
                "cursor": {"type": "string"},
                "active": {"type": "boolean"},
                "tags": {"type": "string", "description": "Comma separated tag names"},
                "name": {"type": "string"},
                "fetchAll": {"type": "boolean", "default": false},
                "maxPages": {"type": "integer", "minimum": 1, "maximum": 1000, "default": DEFAULT_MAX_PAGES}
            },
            "additionalProperties": false
        }))
        .read_only()
        .requires_backend()
        .build(list_workflows_handler)
}

async fn list_workflows_handler(ctx: ToolContext, args: CheckedArgs) -> BridgeResult<Value> {
    let params: ListWorkflowsParams = args.parse()?;
    let mut query = params.query;

    let first = ctx.backend.list_workflows(&ctx.context, &query).await?;
    if !params.fetch_all {
        return Ok(json!({
            "data": first.data,
            "count": first.data.len(),
            "nextCursor": first.next_cursor,
            "retries": first.retries,
        }));
    }

    let mut data = first.data;
    let mut retries = first.retries;
    let mut next_cursor = first.next_cursor;
    let mut pages = 1u64;
    ctx.progress
        .report(pages as f64, None, Some(&format!("fetched {} workflows", data.len())));

    while let Some(cursor) = next_cursor.take() {
        if pages >= params.max_pages {
            next_cursor = Some(cursor);
            break;
        }
        query.cursor = Some(cursor);
        let page = ctx.backend.list_workflows(&ctx.context, &query).await?;
        pages += 1;
        retries += page.retries;
        data.extend(page.data);
        next_cursor = page.next_cursor;
        debug!("list_workflows page {} ({} so far)", pages, data.len());
        ctx.progress
            .report(pages as f64, None, Some(&format!("fetched {} workflows", data.len())));
    }

    Ok(json!({
        "count": data.len(),
        "data": data,
        "pages": pages,
        "truncated": next_cursor.is_some(),
        "nextCursor": next_cursor,
        "retries": retries,
    }))
}

// ============================================================================
// get / create / update / delete / activate
// ============================================================================

fn get_workflow_tool() -> ToolDescriptor {
    ToolBuilder::new("get_workflow")
        .description("Get a workflow by id")
        .input_schema(id_schema("Workflow id"))
        .read_only()
        .requires_backend()
        .build(|ctx: ToolContext, args: CheckedArgs| async move {
            let id = args.required_str("id")?;
            ctx.backend.get_workflow(&ctx.context, id).await.map(body_of)
        })
}

fn workflow_body_schema(with_id: bool) -> Value {
    let mut schema = json!({
        "type": "object",
        "properties": {
            "workflow": {
                "type": "object",
                "description": "Workflow definition (name, nodes, connections, settings)",
                "properties": {
                    "name": {"type": "string", "minLength": 1},
                    "nodes": {"type": "array", "items": {"type": "object"}},
                    "connections": {"type": "object"},
                    "settings": {"type": "object"}
                },
                "required": ["name"]
            }
        },
        "required": ["workflow"],
        "additionalProperties": false
    });
    if with_id {
        schema["properties"]["id"] = json!({"type": "string", "minLength": 1});
        schema["required"] = json!(["id", "workflow"]);
    }
    schema
}

fn create_workflow_tool() -> ToolDescriptor {
    ToolBuilder::new("create_workflow")
        .description("Create a workflow. Settings unsupported by the backend version are dropped.")
        .input_schema(workflow_body_schema(false))
        .requires_backend()
        .build(|ctx: ToolContext, args: CheckedArgs| async move {
            let workflow = args.get("workflow").cloned().unwrap_or(Value::Null);
            ctx.backend
                .create_workflow(&ctx.context, workflow)
                .await
                .map(body_of)
        })
}

fn update_workflow_tool() -> ToolDescriptor {
    ToolBuilder::new("update_workflow")
        .description("Replace a workflow definition")
        .input_schema(workflow_body_schema(true))
        .requires_backend()
        .build(|ctx: ToolContext, args: CheckedArgs| async move {
            let id = args.required_str("id")?;
            let workflow = args.get("workflow").cloned().unwrap_or(Value::Null);
            ctx.backend
                .update_workflow(&ctx.context, id, workflow)
                .await
                .map(body_of)
        })
}

fn delete_workflow_tool() -> ToolDescriptor {
    ToolBuilder::new("delete_workflow")
        .description("Delete a workflow")
        .input_schema(id_schema("Workflow id"))
        .requires_backend()
        .build(|ctx: ToolContext, args: CheckedArgs| async move {
            let id = args.required_str("id")?;
            ctx.backend
                .delete_workflow(&ctx.context, id)
                .await
                .map(body_of)
        })
}

fn set_workflow_active_tool() -> ToolDescriptor {
    ToolBuilder::new("set_workflow_active")
        .description("Activate or deactivate a workflow")
        .input_schema(json!({
            "type": "object",
            "properties": {
                "id": {"type": "string", "minLength": 1},
                "active": {"type": "boolean"}
            },
            "required": ["id", "active"],
            "additionalProperties": false
        }))
        .requires_backend()
        .build(|ctx: ToolContext, args: CheckedArgs| async move {
            let id = args.required_str("id")?;
            let active = args.bool("active").unwrap_or(false);
            ctx.backend
                .set_workflow_active(&ctx.context, id, active)
                .await
                .map(body_of)
        })
}

// ============================================================================
// executions
// ============================================================================

fn list_executions_tool() -> ToolDescriptor {
    ToolBuilder::new("list_executions")
        .description("List workflow executions, newest first")
        .input_schema(json!({
            "type": "object",
            "properties": {
                "workflowId": {"type": "string"},
                "status": {
                    "type": "string",
                    "enum": ["success", "error", "waiting", "running", "canceled"]
                },
                "limit": {"type": "integer", "minimum": 1, "maximum": 250},
                "cursor": {"type": "string"},
                "includeData": {"type": "boolean", "default": false}
            },
            "additionalProperties": false
        }))
        .read_only()
        .requires_backend()
        .build(list_executions_handler)
}

async fn list_executions_handler(ctx: ToolContext, args: CheckedArgs) -> BridgeResult<Value> {
    let query: ExecutionQuery = args.parse()?;
    let page = ctx.backend.list_executions(&ctx.context, &query).await?;
    Ok(json!({
        "count": page.data.len(),
        "data": page.data,
        "nextCursor": page.next_cursor,
        "retries": page.retries,
    }))
}

fn get_execution_tool() -> ToolDescriptor {
    ToolBuilder::new("get_execution")
        .description("Get one execution, optionally with its full run data")
        .input_schema(json!({
            "type": "object",
            "properties": {
                "id": {"type": "string", "minLength": 1},
                "includeData": {"type": "boolean", "default": false}
            },
            "required": ["id"],
            "additionalProperties": false
        }))
        .read_only()
        .requires_backend()
        .build(|ctx: ToolContext, args: CheckedArgs| async move {
            let id = args.required_str("id")?;
            let include_data = args.bool("includeData").unwrap_or(false);
            ctx.backend
                .get_execution(&ctx.context, id, include_data)
                .await
                .map(body_of)
        })
}

fn delete_execution_tool() -> ToolDescriptor {
    ToolBuilder::new("delete_execution")
        .description("Delete an execution record")
        .input_schema(id_schema("Execution id"))
        .requires_backend()
        .build(|ctx: ToolContext, args: CheckedArgs| async move {
            let id = args.required_str("id")?;
            ctx.backend
                .delete_execution(&ctx.context, id)
                .await
                .map(body_of)
        })
}
