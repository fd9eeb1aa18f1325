//! Session lifecycle: one conversation per process.

mod manager;
mod snapshot;
mod state;

pub use manager::{CallGuard, CloseOutcome, NewSession, SessionInfo, SessionManager, SessionSettings};
pub use snapshot::{read_snapshot, write_snapshot, SessionSnapshot, SNAPSHOT_FORMAT_VERSION};
pub use state::{SessionState, TransportMode};
