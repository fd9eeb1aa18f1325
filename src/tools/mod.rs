//! Built-in tools.

mod diagnostics;
mod nodes;
mod templates;
mod workflows;

use crate::dispatcher::Dispatcher;
use crate::error::BridgeResult;

/// Register every built-in tool
pub fn register_all_tools(dispatcher: &mut Dispatcher) -> BridgeResult<()> {
    nodes::register_tools(dispatcher)?;
    templates::register_tools(dispatcher)?;
    workflows::register_tools(dispatcher)?;
    diagnostics::register_tools(dispatcher)?;
    Ok(())
}
