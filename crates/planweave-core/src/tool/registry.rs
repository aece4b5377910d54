//! The `Tool` trait and the name-to-implementation registry.
//!
//! Tools are heterogeneous callables behind a single polymorphic interface,
//! resolved through a name map constructed at startup -- no runtime type
//! inspection. The registry is a read-only collaborator safely shared by all
//! branches; an unresolved name at invocation time is a fatal error for the
//! requesting branch.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use planweave_types::tool::{ToolDescriptor, ToolError};

// ---------------------------------------------------------------------------
// Tool trait + object-safe wrapper
// ---------------------------------------------------------------------------

/// A named callable offered to the model.
pub trait Tool: Send + Sync {
    /// What the completion service sees: name, description, argument schema.
    fn descriptor(&self) -> &ToolDescriptor;

    /// Invoke with already-parsed JSON arguments; returns a list of
    /// structured results.
    fn invoke(
        &self,
        args: Value,
    ) -> impl Future<Output = Result<Vec<Value>, ToolError>> + Send;
}

/// Object-safe version of [`Tool`] with a boxed future.
pub trait ToolDyn: Send + Sync {
    fn descriptor(&self) -> &ToolDescriptor;

    fn invoke_boxed(
        &self,
        args: Value,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Value>, ToolError>> + Send + '_>>;
}

impl<T: Tool> ToolDyn for T {
    fn descriptor(&self) -> &ToolDescriptor {
        Tool::descriptor(self)
    }

    fn invoke_boxed(
        &self,
        args: Value,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Value>, ToolError>> + Send + '_>> {
        Box::pin(self.invoke(args))
    }
}

/// Type-erased tool stored in the registry.
pub struct BoxTool {
    inner: Box<dyn ToolDyn>,
}

impl std::fmt::Debug for BoxTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxTool")
            .field("name", &self.inner.descriptor().name)
            .finish()
    }
}

impl BoxTool {
    pub fn new<T: Tool + 'static>(tool: T) -> Self {
        Self {
            inner: Box::new(tool),
        }
    }

    pub fn descriptor(&self) -> &ToolDescriptor {
        self.inner.descriptor()
    }

    pub async fn invoke(&self, args: Value) -> Result<Vec<Value>, ToolError> {
        self.inner.invoke_boxed(args).await
    }
}

// ---------------------------------------------------------------------------
// ToolRegistry
// ---------------------------------------------------------------------------

/// Name → tool map, built once at startup.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, BoxTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its descriptor name. Re-registering a name
    /// replaces the previous tool.
    pub fn register<T: Tool + 'static>(mut self, tool: T) -> Self {
        let name = tool.descriptor().name.clone();
        self.tools.insert(name, BoxTool::new(tool));
        self
    }

    /// Resolve a tool by name; `None` means the caller must fail the branch.
    pub fn get(&self, name: &str) -> Option<&BoxTool> {
        self.tools.get(name)
    }

    /// Resolve a tool or fail with the fatal unknown-tool error.
    pub fn resolve(&self, name: &str) -> Result<&BoxTool, ToolError> {
        self.get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))
    }

    /// Descriptors for every registered tool, for the completion request.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools
            .values()
            .map(|tool| tool.descriptor().clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
