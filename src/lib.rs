//! Capability Bridge Library
//!
//! MCP bridge that exposes a node catalog and a remote workflow backend to
//! AI agents as typed tools.

pub mod backend;
pub mod bridge;
pub mod catalog;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod protocol;
pub mod server;
pub mod session;
pub mod sqlite_persistence;
pub mod tools;

// Re-export commonly used types for convenience
pub use bridge::{Bridge, BridgeReply, CallOrigin};
pub use error::{BridgeError, BridgeResult, ErrorKind};
pub use server::{make_app, run_server, RequestsLoggingLevel, ServerConfig};
