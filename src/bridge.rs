//! Bridge facade
//!
//! Routes decoded JSON-RPC calls to the session manager and the dispatcher.
//! Transports only decode, call [`Bridge::handle`] and encode the reply.

use std::sync::Arc;
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

use crate::backend::BackendClient;
use crate::catalog::Catalog;
use crate::context::{Context, ContextOverride, ContextResolver};
use crate::dispatcher::{Dispatcher, InvokeOptions, ProgressSink};
use crate::error::BridgeResult;
use crate::protocol::messages::{
    negotiate_protocol_version, InitializeParams, InitializeResult, PingResult,
    ServerCapabilities, ServerInfo, ToolsCallParams, ToolsCapability, ToolsListResult,
};
use crate::protocol::{methods, Call, McpError, McpNotification, McpResponse, RequestId};
use crate::session::{
    CallGuard, CloseOutcome, NewSession, SessionManager, SessionSettings, TransportMode,
};
use crate::tools::register_all_tools;

pub const SERVER_NAME: &str = env!("CARGO_PKG_NAME");
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

const INSTRUCTIONS: &str = "Search the node catalog with search_nodes and inspect entries with \
get_node before building workflows. Backend tools need a configured backend URL and API key.";

/// Transport-level facts about one incoming call.
#[derive(Debug, Clone)]
pub struct CallOrigin {
    /// Value of the `Mcp-Session-Id` header, or the id tracked by stdio.
    pub session_id: Option<String>,
    /// Context fields taken from override headers.
    pub context_override: Option<ContextOverride>,
    pub transport: TransportMode,
    /// Sink for `notifications/progress`, streaming transports only.
    pub notifications: Option<UnboundedSender<McpNotification>>,
}

impl CallOrigin {
    pub fn request_response(session_id: Option<String>) -> Self {
        Self {
            session_id,
            context_override: None,
            transport: TransportMode::RequestResponse,
            notifications: None,
        }
    }

    pub fn with_override(mut self, context_override: Option<ContextOverride>) -> Self {
        self.context_override = context_override.filter(|o| !o.is_empty());
        self
    }

    pub fn streaming(
        session_id: Option<String>,
        notifications: UnboundedSender<McpNotification>,
    ) -> Self {
        Self {
            session_id,
            context_override: None,
            transport: TransportMode::Streaming,
            notifications: Some(notifications),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BridgeReply {
    Response {
        response: McpResponse,
        /// Session the reply belongs to, set on a successful `initialize`.
        session_id: Option<String>,
    },
    /// Notification consumed, nothing to send back.
    Accepted,
}

impl BridgeReply {
    fn response(response: McpResponse) -> Self {
        BridgeReply::Response {
            response,
            session_id: None,
        }
    }

    pub fn into_response(self) -> Option<McpResponse> {
        match self {
            BridgeReply::Response { response, .. } => Some(response),
            BridgeReply::Accepted => None,
        }
    }
}

pub struct Bridge {
    catalog: Arc<Catalog>,
    backend: Arc<BackendClient>,
    resolver: ContextResolver,
    dispatcher: Arc<Dispatcher>,
    sessions: Arc<SessionManager>,
    started: Instant,
}

impl Bridge {
    /// Build a bridge with every built-in tool registered.
    pub fn new(
        catalog: Arc<Catalog>,
        backend: Arc<BackendClient>,
        resolver: ContextResolver,
        session_settings: SessionSettings,
    ) -> BridgeResult<Self> {
        let mut dispatcher = Dispatcher::new(catalog.clone(), backend.clone());
        register_all_tools(&mut dispatcher)?;
        info!("Registered {} tools", dispatcher.registry().tool_count());
        Ok(Self::with_dispatcher(dispatcher, resolver, session_settings))
    }

    pub fn with_dispatcher(
        dispatcher: Dispatcher,
        resolver: ContextResolver,
        session_settings: SessionSettings,
    ) -> Self {
        let catalog = dispatcher.catalog().clone();
        let backend = dispatcher.backend().clone();
        let sessions = Arc::new(SessionManager::new(backend.clone(), session_settings));
        Self {
            catalog,
            backend,
            resolver,
            dispatcher: Arc::new(dispatcher),
            sessions,
            started: Instant::now(),
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn backend(&self) -> &Arc<BackendClient> {
        &self.backend
    }

    pub fn resolver(&self) -> &ContextResolver {
        &self.resolver
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn uptime(&self) -> std::time::Duration {
        self.started.elapsed()
    }

    /// Close the session named by `session_id`, or the bound one.
    pub async fn close_session(&self, session_id: Option<&str>) -> BridgeResult<CloseOutcome> {
        self.sessions.close(session_id).await
    }

    /// Handle one decoded call.
    pub async fn handle(&self, call: Call, origin: CallOrigin) -> BridgeReply {
        match call {
            Call::Notification { method, params } => {
                self.handle_notification(&method, params, &origin);
                BridgeReply::Accepted
            }
            Call::Request { id, method, params } => {
                if method == methods::INITIALIZE {
                    return self.handle_initialize(id, params, &origin);
                }
                if method == methods::INITIALIZED {
                    // Some clients send the notification with an id.
                    self.handle_notification(&method, params, &origin);
                    return BridgeReply::response(McpResponse::success(id, json!({})));
                }
                let result = self.handle_request(&id, &method, params, &origin).await;
                BridgeReply::response(match result {
                    Ok(value) => McpResponse::success(id, value),
                    Err(error) => McpResponse::error(Some(id), error),
                })
            }
        }
    }

    fn handle_notification(&self, method: &str, params: Option<Value>, origin: &CallOrigin) {
        match method {
            methods::INITIALIZED => {
                match self.sessions.mark_initialized(origin.session_id.as_deref()) {
                    Ok(info) => debug!("Session {} ready", info.id),
                    Err(e) => debug!("Ignoring initialized notification: {}", e),
                }
            }
            methods::CANCELLED => {
                debug!("Client cancelled request: {:?}", params);
            }
            other => debug!("Ignoring notification {}", other),
        }
    }

    fn handle_initialize(
        &self,
        id: RequestId,
        params: Option<Value>,
        origin: &CallOrigin,
    ) -> BridgeReply {
        match self.initialize(params, origin) {
            Ok((result, session_id)) => BridgeReply::Response {
                response: McpResponse::success(id, result),
                session_id: Some(session_id),
            },
            Err(error) => BridgeReply::response(McpResponse::error(Some(id), error)),
        }
    }

    fn initialize(
        &self,
        params: Option<Value>,
        origin: &CallOrigin,
    ) -> Result<(Value, String), McpError> {
        let params: InitializeParams = parse_params(params)?.unwrap_or_default();

        let context_override = match (origin.context_override.clone(), params.context) {
            (Some(headers), Some(body)) => Some(headers.merged_with(body)),
            (headers, body) => body.or(headers),
        };
        let context = self.resolver.resolve(context_override.as_ref())?;

        let protocol_version = negotiate_protocol_version(params.protocol_version.as_deref());
        let info = self.sessions.initialize(NewSession {
            context,
            transport_mode: origin.transport,
            protocol_version: protocol_version.clone(),
            client_info: params.client_info,
        })?;

        let result = InitializeResult {
            protocol_version,
            capabilities: ServerCapabilities {
                tools: ToolsCapability {
                    list_changed: false,
                },
            },
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: SERVER_VERSION.to_string(),
            },
            instructions: Some(INSTRUCTIONS.to_string()),
        };
        let value =
            serde_json::to_value(result).map_err(|e| McpError::InternalError(e.to_string()))?;
        Ok((value, info.id))
    }

    async fn handle_request(
        &self,
        id: &RequestId,
        method: &str,
        params: Option<Value>,
        origin: &CallOrigin,
    ) -> Result<Value, McpError> {
        if method == methods::SHUTDOWN {
            let outcome = self.close_session(origin.session_id.as_deref()).await?;
            return to_value(outcome);
        }

        // Session calls hold a guard for their whole duration so that
        // shutdown can drain them.
        let guard = match &origin.session_id {
            Some(session_id) => Some(self.sessions.begin_call(session_id, method)?),
            None => None,
        };
        if let (Some(guard), Some(context_override)) = (&guard, &origin.context_override) {
            let conflicts = guard.context().conflicting_fields(context_override);
            if !conflicts.is_empty() {
                return Err(McpError::SessionContextConflict(format!(
                    "session {} is bound to another context, conflicting fields: {}",
                    guard.session_id(),
                    conflicts.join(", ")
                )));
            }
        }

        match method {
            methods::PING => to_value(PingResult {}),
            methods::TOOLS_LIST => to_value(ToolsListResult {
                tools: self.dispatcher.list(),
            }),
            methods::TOOLS_CALL => self.tools_call(id, params, origin, guard.as_ref()).await,
            other => Err(McpError::MethodNotFound(other.to_string())),
        }
    }

    async fn tools_call(
        &self,
        id: &RequestId,
        params: Option<Value>,
        origin: &CallOrigin,
        guard: Option<&CallGuard>,
    ) -> Result<Value, McpError> {
        let params: ToolsCallParams = parse_params(params)?
            .ok_or_else(|| McpError::InvalidParams("missing params".to_string()))?;
        if !self.dispatcher.contains(&params.name) {
            return Err(McpError::InvalidParams(format!(
                "unknown tool: {}",
                params.name
            )));
        }

        let context: Arc<Context> = match guard {
            Some(guard) => guard.context(),
            None => Arc::new(self.resolver.resolve(origin.context_override.as_ref())?),
        };

        let progress = match &origin.notifications {
            Some(sender) => {
                let token = params
                    .progress_token()
                    .or_else(|| serde_json::to_value(id).ok())
                    .unwrap_or(Value::Null);
                ProgressSink::new(token, sender.clone())
            }
            None => ProgressSink::disabled(),
        };

        let result = self
            .dispatcher
            .invoke_with(
                &params.name,
                params.arguments,
                context,
                InvokeOptions {
                    progress,
                    session_id: guard.map(|g| g.session_id().to_string()),
                },
            )
            .await;
        to_value(result.to_call_result())
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<Option<T>, McpError> {
    params
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| McpError::InvalidParams(e.to_string()))
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value, McpError> {
    serde_json::to_value(value).map_err(|e| McpError::InternalError(e.to_string()))
}
