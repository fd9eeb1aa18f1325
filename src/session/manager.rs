//! The single conversation bound to this process.
//!
//! State changes happen under one mutex that is never held across an await.
//! In-flight calls are counted per session so that shutdown can drain them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::snapshot::{SessionSnapshot, SNAPSHOT_FORMAT_VERSION};
use super::state::{SessionState, TransportMode};
use crate::backend::BackendClient;
use crate::context::{Context, ContextResolver};
use crate::error::{
    BridgeError, BridgeResult, SESSION_ALREADY_ACTIVE, SESSION_NOT_FOUND, SESSION_NOT_READY,
};
use crate::protocol::messages::ClientInfo;
use crate::server::metrics;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Sessions idle for longer than this are shut down by the reaper.
    pub idle_timeout_secs: u64,
    /// Upper bound on waiting for in-flight calls when closing.
    pub drain_timeout_ms: u64,
    pub reap_interval_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 3_600,
            drain_timeout_ms: 30_000,
            reap_interval_secs: 60,
        }
    }
}

impl SessionSettings {
    fn idle_timeout_ms(&self) -> i64 {
        (self.idle_timeout_secs as i64).saturating_mul(1_000)
    }
}

/// Inputs captured from `initialize`.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub context: Context,
    pub transport_mode: TransportMode,
    pub protocol_version: String,
    pub client_info: Option<ClientInfo>,
}

/// Public view of the session, safe to log and report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: String,
    pub state: SessionState,
    pub created_at: i64,
    pub last_activity_at: i64,
    pub transport_mode: TransportMode,
    pub protocol_version: String,
    pub client_info: Option<ClientInfo>,
    pub in_flight: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseOutcome {
    pub session_id: String,
    /// False when the drain timeout expired with calls still running.
    pub drained: bool,
    pub abandoned_calls: usize,
}

#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

struct Session {
    id: String,
    state: SessionState,
    created_at: i64,
    last_activity_at: i64,
    context: Arc<Context>,
    transport_mode: TransportMode,
    protocol_version: String,
    client_info: Option<ClientInfo>,
    in_flight: Arc<InFlight>,
}

impl Session {
    fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id.clone(),
            state: self.state,
            created_at: self.created_at,
            last_activity_at: self.last_activity_at,
            transport_mode: self.transport_mode,
            protocol_version: self.protocol_version.clone(),
            client_info: self.client_info.clone(),
            in_flight: self.in_flight.count.load(Ordering::SeqCst),
        }
    }

    fn transition(&mut self, next: SessionState) -> BridgeResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(BridgeError::protocol(
                SESSION_NOT_READY,
                format!("session cannot move from {} to {}", self.state, next),
            ));
        }
        debug!("Session {}: {} -> {}", self.id, self.state, next);
        self.state = next;
        metrics::set_session_state(next.as_str());
        Ok(())
    }
}

/// Keeps a call counted as in flight until dropped.
pub struct CallGuard {
    session_id: String,
    context: Arc<Context>,
    in_flight: Arc<InFlight>,
}

impl CallGuard {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The context bound to the session.
    pub fn context(&self) -> Arc<Context> {
        self.context.clone()
    }
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        if self.in_flight.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.in_flight.idle.notify_waiters();
        }
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn not_found(id: &str) -> BridgeError {
    BridgeError::protocol(SESSION_NOT_FOUND, format!("session not found: {}", id))
}

pub struct SessionManager {
    slot: Mutex<Option<Session>>,
    backend: Arc<BackendClient>,
    settings: SessionSettings,
}

impl SessionManager {
    pub fn new(backend: Arc<BackendClient>, settings: SessionSettings) -> Self {
        Self {
            slot: Mutex::new(None),
            backend,
            settings,
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    fn lock(&self) -> MutexGuard<'_, Option<Session>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Session named by `id`, or the current one when `id` is `None`.
    fn find<'a>(slot: &'a mut Option<Session>, id: Option<&str>) -> BridgeResult<&'a mut Session> {
        match (slot.as_mut(), id) {
            (Some(session), Some(id)) if session.id == id => Ok(session),
            (Some(session), None) => Ok(session),
            (_, Some(id)) => Err(not_found(id)),
            (None, None) => Err(BridgeError::protocol(SESSION_NOT_FOUND, "no active session")),
        }
    }

    /// Bind a new session. Fails while another session holds the slot.
    pub fn initialize(&self, new: NewSession) -> BridgeResult<SessionInfo> {
        let mut slot = self.lock();
        if let Some(existing) = slot.as_ref() {
            if existing.state != SessionState::Closed {
                return Err(BridgeError::protocol(
                    SESSION_ALREADY_ACTIVE,
                    "session already active",
                ));
            }
        }

        let now = now_millis();
        let mut session = Session {
            id: uuid::Uuid::new_v4().to_string(),
            state: SessionState::Created,
            created_at: now,
            last_activity_at: now,
            context: Arc::new(new.context),
            transport_mode: new.transport_mode,
            protocol_version: new.protocol_version,
            client_info: new.client_info,
            in_flight: Arc::new(InFlight::default()),
        };
        session.transition(SessionState::Initializing)?;
        info!(
            "Session {} bound (client: {})",
            session.id,
            session
                .client_info
                .as_ref()
                .map(|c| c.name.as_str())
                .unwrap_or("unknown")
        );
        let info = session.info();
        *slot = Some(session);
        Ok(info)
    }

    /// Handle `notifications/initialized`. Repeats are ignored.
    pub fn mark_initialized(&self, id: Option<&str>) -> BridgeResult<SessionInfo> {
        let mut slot = self.lock();
        let session = Self::find(&mut slot, id)?;
        if session.state == SessionState::Initializing {
            session.transition(SessionState::Ready)?;
        } else if session.state != SessionState::Ready {
            return Err(BridgeError::protocol(
                SESSION_NOT_READY,
                format!("cannot complete initialization while {}", session.state),
            ));
        }
        session.last_activity_at = now_millis();
        Ok(session.info())
    }

    /// Admit a request for `method` on session `id`.
    pub fn begin_call(&self, id: &str, method: &str) -> BridgeResult<CallGuard> {
        let mut slot = self.lock();
        let session = Self::find(&mut slot, Some(id))?;
        if !session.state.accepts(method) {
            return Err(BridgeError::protocol(
                SESSION_NOT_READY,
                format!("{} is not accepted while the session is {}", method, session.state),
            ));
        }
        session.last_activity_at = now_millis();
        session.in_flight.count.fetch_add(1, Ordering::SeqCst);
        Ok(CallGuard {
            session_id: session.id.clone(),
            context: session.context.clone(),
            in_flight: session.in_flight.clone(),
        })
    }

    pub fn current(&self) -> Option<SessionInfo> {
        self.lock().as_ref().map(Session::info)
    }

    pub fn current_id(&self) -> Option<String> {
        self.lock().as_ref().map(|s| s.id.clone())
    }

    pub fn state(&self) -> Option<SessionState> {
        self.lock().as_ref().map(|s| s.state)
    }

    pub fn is_bound(&self) -> bool {
        self.lock().is_some()
    }

    /// Shut the session down: reject new calls, wait for in-flight ones up to
    /// the drain timeout, then release its context and backend pool.
    pub async fn close(&self, id: Option<&str>) -> BridgeResult<CloseOutcome> {
        let (session_id, in_flight) = {
            let mut slot = self.lock();
            let session = Self::find(&mut slot, id)?;
            if session.state == SessionState::ShuttingDown {
                return Err(BridgeError::protocol(
                    SESSION_NOT_READY,
                    format!("session {} is already shutting down", session.id),
                ));
            }
            session.transition(SessionState::ShuttingDown)?;
            (session.id.clone(), session.in_flight.clone())
        };

        let drain_timeout = Duration::from_millis(self.settings.drain_timeout_ms);
        let drained = tokio::time::timeout(drain_timeout, async {
            loop {
                let idle = in_flight.idle.notified();
                if in_flight.count.load(Ordering::SeqCst) == 0 {
                    break;
                }
                idle.await;
            }
        })
        .await
        .is_ok();
        let abandoned_calls = in_flight.count.load(Ordering::SeqCst);
        if !drained {
            warn!(
                "Session {}: drain timeout expired with {} calls in flight",
                session_id, abandoned_calls
            );
        }

        let released = {
            let mut slot = self.lock();
            match slot.as_mut() {
                Some(session) if session.id == session_id => {
                    session.transition(SessionState::Closed)?;
                    slot.take()
                }
                _ => None,
            }
        };
        if let Some(session) = released {
            if let Some(base_url) = &session.context.backend_base_url {
                self.backend.forget(base_url);
            }
            info!("Session {} closed", session.id);
        }

        Ok(CloseOutcome {
            session_id,
            drained,
            abandoned_calls,
        })
    }

    /// Close the session if it has been idle past the configured timeout as
    /// of `now` (unix millis). No client or backend is notified.
    pub async fn reap_idle_at(&self, now: i64) -> Option<CloseOutcome> {
        let idle_id = {
            let slot = self.lock();
            slot.as_ref()
                .filter(|s| s.state.is_live())
                .filter(|s| now - s.last_activity_at >= self.settings.idle_timeout_ms())
                .map(|s| s.id.clone())
        }?;
        info!("Session {} idle for too long, shutting down", idle_id);
        self.close(Some(&idle_id)).await.ok()
    }

    pub async fn reap_idle(&self) -> Option<CloseOutcome> {
        self.reap_idle_at(now_millis()).await
    }

    /// Run the idle reaper until `cancel` fires.
    pub fn spawn_reaper(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let manager = self.clone();
        let period = Duration::from_secs(self.settings.reap_interval_secs.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        manager.reap_idle().await;
                    }
                }
            }
            debug!("Session reaper stopped");
        })
    }

    /// Capture the current session for hand-off to another process.
    pub fn export_state(&self) -> BridgeResult<SessionSnapshot> {
        let slot = self.lock();
        let session = slot
            .as_ref()
            .ok_or_else(|| BridgeError::protocol(SESSION_NOT_FOUND, "no active session"))?;
        if session.state != SessionState::Ready {
            return Err(BridgeError::protocol(
                SESSION_NOT_READY,
                format!("only ready sessions can be exported, session is {}", session.state),
            ));
        }
        Ok(SessionSnapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            session_id: session.id.clone(),
            created_at: session.created_at,
            last_activity_at: session.last_activity_at,
            state: session.state,
            transport_mode: session.transport_mode,
            protocol_version: session.protocol_version.clone(),
            client_info: session.client_info.clone(),
            context: session.context.as_ref().clone(),
        })
    }

    /// Rebind an exported session. The context is validated again and the
    /// session enters `Ready` directly.
    pub fn restore_state(
        &self,
        snapshot: SessionSnapshot,
        resolver: &ContextResolver,
    ) -> BridgeResult<SessionInfo> {
        resolver.validate(&snapshot.context)?;

        let mut slot = self.lock();
        if slot.as_ref().map_or(false, |s| s.state != SessionState::Closed) {
            return Err(BridgeError::protocol(
                SESSION_ALREADY_ACTIVE,
                "session already active",
            ));
        }
        let session = Session {
            id: snapshot.session_id,
            state: SessionState::Ready,
            created_at: snapshot.created_at,
            last_activity_at: snapshot.last_activity_at,
            context: Arc::new(snapshot.context),
            transport_mode: snapshot.transport_mode,
            protocol_version: snapshot.protocol_version,
            client_info: snapshot.client_info,
            in_flight: Arc::new(InFlight::default()),
        };
        metrics::set_session_state(SessionState::Ready.as_str());
        info!("Session {} restored", session.id);
        let info = session.info();
        *slot = Some(session);
        Ok(info)
    }
}
