//! Wire protocol: MCP message types and JSON-RPC framing.

pub mod codec;
pub mod messages;

pub use codec::{decode, decode_value, encode, Call, DecodeError};
pub use messages::{
    methods, McpError, McpNotification, McpResponse, RequestId, MCP_PROTOCOL_VERSION,
};
