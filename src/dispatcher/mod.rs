//! Capability dispatcher: tool registry, argument validation and
//! bounded-time execution.

mod context;
mod invoke;
mod registry;
mod result;
pub mod schema;

pub use context::{ProgressSink, ToolContext};
pub use invoke::{Dispatcher, InvokeOptions};
pub use registry::{ToolBuilder, ToolDescriptor, ToolFuture, ToolHandler, ToolRegistry};
pub use result::OperationResult;
pub use schema::CheckedArgs;
