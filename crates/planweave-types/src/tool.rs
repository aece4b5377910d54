//! Tool contract types for Planweave.
//!
//! A tool is a named callable with a JSON-schema argument contract. The model
//! requests tool invocations as [`ToolCall`]s; the orchestrator resolves each
//! call by name and records the structured output as a `ToolResult`
//! (see the `task` module).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A tool invocation requested by the model.
///
/// `arguments` is the raw JSON string as produced by the completion service;
/// it is parsed at invocation time so that malformed arguments surface as a
/// tool error rather than a deserialization panic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Correlation id assigned by the completion service. Tool-result
    /// messages are keyed by this id.
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// Serialized JSON arguments.
    pub arguments: String,
}

/// Static description of a tool: what the completion service sees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique tool name. Lookup key in the registry.
    pub name: String,
    /// Human-readable description shown to the model.
    pub description: String,
    /// JSON schema for the tool's arguments.
    pub parameters: serde_json::Value,
}

impl ToolDescriptor {
    /// Build a descriptor whose argument schema is derived from `P`.
    pub fn new<P: JsonSchema>(name: impl Into<String>, description: impl Into<String>) -> Self {
        let schema = schemars::schema_for!(P);
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::to_value(schema).unwrap_or_default(),
        }
    }
}

/// Errors from tool resolution and invocation.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The model requested a tool name that is not registered. Fatal.
    #[error("unknown tool: '{0}'")]
    UnknownTool(String),

    /// The call's argument payload did not match the tool's schema.
    #[error("invalid arguments for tool '{tool}': {message}")]
    InvalidArguments { tool: String, message: String },

    /// The tool itself failed while executing.
    #[error("tool '{tool}' invocation failed: {message}")]
    Invocation { tool: String, message: String },
}
