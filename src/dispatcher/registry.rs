//! Tool Registry
//!
//! Tools are registered explicitly at startup. The registry is read-only once
//! the dispatcher is shared.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use super::context::ToolContext;
use super::schema::{ArgsSchema, CheckedArgs};
use crate::error::{BridgeError, BridgeResult};
use crate::protocol::messages::{ToolAnnotations, ToolDefinition};

// ============================================================================
// Tool Types
// ============================================================================

/// Boxed future for async tool execution
pub type ToolFuture = Pin<Box<dyn Future<Output = BridgeResult<Value>> + Send>>;

/// Tool handler function type
pub type ToolHandler = Arc<dyn Fn(ToolContext, CheckedArgs) -> ToolFuture + Send + Sync>;

/// A registered tool with metadata and handler
#[derive(Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub annotations: ToolAnnotations,
    pub handler: ToolHandler,
}

impl ToolDescriptor {
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.clone(),
            annotations: self.annotations,
        }
    }
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("annotations", &self.annotations)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Registry
// ============================================================================

struct RegisteredTool {
    descriptor: ToolDescriptor,
    args: ArgsSchema,
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Names are unique and the input schema is compiled
    /// here, once.
    pub fn register(&mut self, tool: ToolDescriptor) -> BridgeResult<()> {
        if tool.name.trim().is_empty() {
            return Err(BridgeError::validation("tool name must not be empty"));
        }
        if self.tools.contains_key(&tool.name) {
            return Err(BridgeError::validation(format!(
                "tool already registered: {}",
                tool.name
            )));
        }
        let args = ArgsSchema::compile(&tool.input_schema)
            .map_err(|e| BridgeError::validation(format!("tool {}: {}", tool.name, e)))?;
        self.tools.insert(
            tool.name.clone(),
            RegisteredTool {
                descriptor: tool,
                args,
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name).map(|t| &t.descriptor)
    }

    /// Validate arguments for `name` against its compiled schema.
    pub fn check_args(&self, name: &str, args: Option<Value>) -> BridgeResult<CheckedArgs> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| BridgeError::not_found("tool", name))?;
        tool.args.check(args)
    }

    /// Definitions of every tool, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.descriptor.definition()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }
}

// ============================================================================
// Builder helpers
// ============================================================================

/// Builder for registering a tool
pub struct ToolBuilder {
    name: String,
    description: String,
    input_schema: Value,
    annotations: ToolAnnotations,
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
            annotations: ToolAnnotations::default(),
        }
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    pub fn input_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.annotations.read_only = true;
        self
    }

    pub fn requires_backend(mut self) -> Self {
        self.annotations.requires_backend = true;
        self
    }

    pub fn build<F, Fut>(self, handler: F) -> ToolDescriptor
    where
        F: Fn(ToolContext, CheckedArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BridgeResult<Value>> + Send + 'static,
    {
        ToolDescriptor {
            name: self.name,
            description: self.description,
            input_schema: self.input_schema,
            annotations: self.annotations,
            handler: Arc::new(move |ctx, args| Box::pin(handler(ctx, args))),
        }
    }
}
