//! Bounded-time tool execution.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, warn};

use super::context::{ProgressSink, ToolContext};
use super::registry::{ToolDescriptor, ToolRegistry};
use super::result::OperationResult;
use crate::backend::BackendClient;
use crate::catalog::Catalog;
use crate::context::Context;
use crate::error::{BackendErrorCode, BridgeError, BridgeResult};
use crate::protocol::messages::ToolDefinition;
use crate::server::metrics;

/// Per-invocation inputs other than the tool name and arguments.
#[derive(Debug, Clone, Default)]
pub struct InvokeOptions {
    pub progress: ProgressSink,
    pub session_id: Option<String>,
}

pub struct Dispatcher {
    registry: ToolRegistry,
    catalog: Arc<Catalog>,
    backend: Arc<BackendClient>,
    start_time: Instant,
}

impl Dispatcher {
    pub fn new(catalog: Arc<Catalog>, backend: Arc<BackendClient>) -> Self {
        Self {
            registry: ToolRegistry::new(),
            catalog,
            backend,
            start_time: Instant::now(),
        }
    }

    pub fn register(&mut self, tool: ToolDescriptor) -> BridgeResult<()> {
        self.registry.register(tool)
    }

    pub fn list(&self) -> Vec<ToolDefinition> {
        self.registry.definitions()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.registry.get(name).is_some()
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn backend(&self) -> &Arc<BackendClient> {
        &self.backend
    }

    pub fn start_time(&self) -> Instant {
        self.start_time
    }

    pub async fn invoke(&self, name: &str, args: Option<Value>, context: Arc<Context>) -> OperationResult {
        self.invoke_with(name, args, context, InvokeOptions::default())
            .await
    }

    /// Validate `args`, run the handler on its own task under the context's
    /// deadline and fold every outcome into an [`OperationResult`].
    pub async fn invoke_with(
        &self,
        name: &str,
        args: Option<Value>,
        context: Arc<Context>,
        options: InvokeOptions,
    ) -> OperationResult {
        let started = Instant::now();
        let outcome = self.run(name, args, context, options).await;
        let result = match outcome {
            Ok(data) => OperationResult::ok(data, started.elapsed()),
            Err(err) => {
                debug!("Tool {} failed: {}", name, err);
                OperationResult::failed(&err, started.elapsed())
            }
        };
        metrics::record_tool_invocation(name, result.outcome(), started.elapsed());
        result
    }

    async fn run(
        &self,
        name: &str,
        args: Option<Value>,
        context: Arc<Context>,
        options: InvokeOptions,
    ) -> BridgeResult<Value> {
        let tool = self
            .registry
            .get(name)
            .ok_or_else(|| BridgeError::not_found("tool", name))?;

        let checked = self.registry.check_args(name, args)?;
        if tool.annotations.requires_backend {
            context.require_backend()?;
        }

        let timeout_ms = context.timeout_ms;
        let deadline = context.timeout();
        let ctx = ToolContext {
            context,
            catalog: self.catalog.clone(),
            backend: self.backend.clone(),
            progress: options.progress,
            session_id: options.session_id,
            start_time: self.start_time,
        };

        let mut handle = tokio::spawn((tool.handler)(ctx, checked));
        match tokio::time::timeout(deadline, &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) if join_error.is_panic() => {
                warn!("Tool {} panicked", name);
                Err(BridgeError::backend(
                    BackendErrorCode::ServerError,
                    None,
                    format!("tool {} failed unexpectedly", name),
                ))
            }
            Ok(Err(_)) => Err(BridgeError::backend(
                BackendErrorCode::ServerError,
                None,
                format!("tool {} was cancelled", name),
            )),
            Err(_) => {
                handle.abort();
                warn!("Tool {} exceeded {}ms, aborted", name, timeout_ms);
                Err(BridgeError::timeout(format!("tool {}", name), timeout_ms))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendSettings;
    use crate::catalog::CatalogEntry;
    use crate::context::ApiKey;
    use crate::dispatcher::{CheckedArgs, ToolBuilder};
    use crate::error::ErrorKind;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn context(timeout_ms: u64) -> Arc<Context> {
        Arc::new(Context {
            backend_base_url: None,
            backend_api_key: ApiKey::default(),
            timeout_ms,
            max_retries: 0,
            tenant_id: None,
            metadata: BTreeMap::new(),
        })
    }

    fn entry(type_key: &str, display_name: &str) -> CatalogEntry {
        serde_json::from_value(json!({
            "typeKey": type_key,
            "displayName": display_name,
            "description": format!("{} node", display_name),
        }))
        .unwrap()
    }

    fn dispatcher() -> Dispatcher {
        let catalog = Arc::new(Catalog::default());
        catalog.refresh(vec![
            entry("vendor.emailSend", "Email Sender"),
            entry("vendor.httpRequest", "HTTP Request"),
        ]);
        let backend = Arc::new(BackendClient::new(BackendSettings::default()).unwrap());
        Dispatcher::new(catalog, backend)
    }

    async fn lookup(ctx: ToolContext, args: CheckedArgs) -> BridgeResult<Value> {
        let query = args.required_str("query")?;
        let page = ctx
            .catalog
            .search(query, &Default::default(), None, 0)?;
        let hits: Vec<Value> = page
            .hits
            .iter()
            .map(|h| json!({"typeKey": h.entry.type_key, "displayName": h.entry.display_name}))
            .collect();
        Ok(Value::Array(hits))
    }

    #[tokio::test]
    async fn test_lookup_scenario() {
        let mut dispatcher = dispatcher();
        dispatcher
            .register(
                ToolBuilder::new("lookup")
                    .input_schema(json!({
                        "type": "object",
                        "properties": {"query": {"type": "string"}},
                        "required": ["query"]
                    }))
                    .build(lookup),
            )
            .unwrap();

        let result = dispatcher
            .invoke("lookup", Some(json!({"query": "email"})), context(1_000))
            .await;
        assert!(result.success);
        assert_eq!(
            result.data,
            Some(json!([{"typeKey": "vendor.emailSend", "displayName": "Email Sender"}]))
        );
    }

    #[tokio::test]
    async fn test_invalid_arguments_never_reach_handler() {
        let called = Arc::new(AtomicBool::new(false));
        let flag = called.clone();
        let mut dispatcher = dispatcher();
        dispatcher
            .register(
                ToolBuilder::new("lookup")
                    .input_schema(json!({
                        "type": "object",
                        "properties": {"query": {"type": "string"}},
                        "required": ["query"]
                    }))
                    .build(move |_ctx, _args| {
                        let flag = flag.clone();
                        async move {
                            flag.store(true, Ordering::SeqCst);
                            Ok(Value::Null)
                        }
                    }),
            )
            .unwrap();

        let result = dispatcher.invoke("lookup", Some(json!({})), context(1_000)).await;
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::Validation));
        assert!(!called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_blocking_handler_times_out() {
        let mut dispatcher = dispatcher();
        dispatcher
            .register(ToolBuilder::new("sleepy").build(|_ctx, _args| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(Value::Null)
            }))
            .unwrap();

        let started = Instant::now();
        let result = dispatcher.invoke("sleepy", None, context(50)).await;
        assert_eq!(result.error_kind, Some(ErrorKind::Timeout));
        assert!(started.elapsed() < Duration::from_millis(1_000));
    }

    #[tokio::test]
    async fn test_panicking_handler_is_a_server_error() {
        let mut dispatcher = dispatcher();
        dispatcher
            .register(ToolBuilder::new("broken").build(|_ctx, _args| async {
                if true {
                    panic!("handler bug");
                }
                Ok(Value::Null)
            }))
            .unwrap();

        let result = dispatcher.invoke("broken", None, context(1_000)).await;
        assert_eq!(result.error_kind, Some(ErrorKind::Backend));
        assert_eq!(
            result.error_detail.unwrap().code.as_deref(),
            Some("SERVER_ERROR")
        );
    }

    #[tokio::test]
    async fn test_handler_errors_keep_their_kind() {
        let mut dispatcher = dispatcher();
        dispatcher
            .register(ToolBuilder::new("missing").build(|ctx, _args| async move {
                ctx.catalog.get("nope").map(|_| Value::Null)
            }))
            .unwrap();

        let result = dispatcher.invoke("missing", None, context(1_000)).await;
        assert_eq!(result.error_kind, Some(ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn test_backend_tools_need_a_backend() {
        let mut dispatcher = dispatcher();
        dispatcher
            .register(
                ToolBuilder::new("remote")
                    .requires_backend()
                    .build(|_ctx, _args| async { Ok(Value::Null) }),
            )
            .unwrap();

        let result = dispatcher.invoke("remote", None, context(1_000)).await;
        assert_eq!(result.error_kind, Some(ErrorKind::Validation));
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let result = dispatcher().invoke("ghost", None, context(1_000)).await;
        assert_eq!(result.error_kind, Some(ErrorKind::NotFound));
    }
}
