use serde::{Deserialize, Serialize};
use std::fmt;

use crate::protocol::methods;

/// Lifecycle of the conversation bound to this process.
///
/// `Created -> Initializing -> Ready -> ShuttingDown -> Closed`. Any live
/// state may also move straight to `ShuttingDown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Created,
    Initializing,
    Ready,
    ShuttingDown,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Created => "created",
            SessionState::Initializing => "initializing",
            SessionState::Ready => "ready",
            SessionState::ShuttingDown => "shutting_down",
            SessionState::Closed => "closed",
        }
    }

    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Created, Initializing)
                | (Initializing, Ready)
                | (Created | Initializing | Ready, ShuttingDown)
                | (ShuttingDown, Closed)
        )
    }

    /// Still holding the slot and accepting some traffic.
    pub fn is_live(self) -> bool {
        matches!(
            self,
            SessionState::Created | SessionState::Initializing | SessionState::Ready
        )
    }

    /// Whether a request for `method` may run in this state.
    pub fn accepts(self, method: &str) -> bool {
        match method {
            methods::PING => self.is_live(),
            methods::TOOLS_LIST => {
                matches!(self, SessionState::Initializing | SessionState::Ready)
            }
            methods::TOOLS_CALL => self == SessionState::Ready,
            _ => self.is_live(),
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the client talks to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportMode {
    #[serde(rename = "request-response")]
    RequestResponse,
    #[serde(rename = "streaming")]
    Streaming,
}
