//! Diagnostics Tool
//!
//! Reports how the bridge sees itself for the calling context.

use serde_json::{json, Value};

use crate::dispatcher::{CheckedArgs, Dispatcher, ToolBuilder, ToolContext, ToolDescriptor};
use crate::error::BridgeResult;

pub fn register_tools(dispatcher: &mut Dispatcher) -> BridgeResult<()> {
    dispatcher.register(bridge_diagnostics_tool())
}

fn bridge_diagnostics_tool() -> ToolDescriptor {
    ToolBuilder::new("bridge_diagnostics")
        .description(
            "Show bridge version, uptime, catalog size and the effective backend configuration \
             (credentials are never included)",
        )
        .input_schema(json!({
            "type": "object",
            "properties": {
                "probeBackend": {
                    "type": "boolean",
                    "default": false,
                    "description": "Also call the backend health endpoint"
                }
            },
            "additionalProperties": false
        }))
        .read_only()
        .build(bridge_diagnostics_handler)
}

async fn bridge_diagnostics_handler(ctx: ToolContext, args: CheckedArgs) -> BridgeResult<Value> {
    let (nodes, templates) = ctx.catalog.counts();
    let context = &ctx.context;
    let settings = ctx.backend.settings();

    let probe = if args.bool("probeBackend").unwrap_or(false) && context.has_backend() {
        Some(match ctx.backend.health_check(context).await {
            Ok(response) => json!({
                "ok": true,
                "status": response.status,
                "backendVersion": response.version,
            }),
            Err(err) => json!({
                "ok": false,
                "errorKind": err.kind(),
                "message": err.to_string(),
            }),
        })
    } else {
        None
    };

    Ok(json!({
        "server": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "gitHash": env!("GIT_HASH"),
            "uptimeSecs": ctx.start_time.elapsed().as_secs(),
        },
        "sessionId": ctx.session_id,
        "catalog": {
            "nodes": nodes,
            "templates": templates,
            "categories": ctx.catalog.categories().len(),
            "persisted": ctx.catalog.store().is_some(),
        },
        "backend": {
            "configured": context.has_backend(),
            "baseUrl": context.backend_base_url,
            "apiKeyFingerprint": (!context.backend_api_key.is_empty())
                .then(|| context.backend_api_key.fingerprint()),
            "authHeader": settings.auth_header,
            "cachedVersions": ctx.backend.cached_versions(),
            "availablePermits": ctx.backend.available_permits(),
            "maxInFlight": settings.max_in_flight,
            "probe": probe,
        },
        "context": {
            "timeoutMs": context.timeout_ms,
            "maxRetries": context.max_retries,
            "tenantId": context.tenant_id,
            "metadataKeys": context.metadata.keys().collect::<Vec<_>>(),
        },
    }))
}
