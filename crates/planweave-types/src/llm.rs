//! LLM gateway request/response shapes.
//!
//! The gateway submits a conversation -- optionally with tool definitions or
//! a structured-output schema -- to an external completion service. Free-text
//! mode yields a [`ChatOutcome`]; structured mode yields a
//! [`StructuredOutcome`] whose `value` is `None` when the service could not
//! produce schema-conforming output (callers treat that as fatal).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tool::ToolCall;

/// Token usage for one completion call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    /// Fold another call's usage into this accumulator.
    pub fn absorb(&mut self, other: Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// Outcome of a free-text (or tool-selecting) completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatOutcome {
    /// Assistant text, if any was produced.
    pub content: Option<String>,
    /// Tool invocations the model requested. May be empty.
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    pub usage: Usage,
}

impl ChatOutcome {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
            usage: Usage::default(),
        }
    }

    pub fn tools(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: None,
            tool_calls,
            usage: Usage::default(),
        }
    }
}

/// Outcome of a structured (schema-constrained) completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredOutcome {
    /// Parsed object, or `None` when the service failed to conform to the
    /// schema. Callers treat `None` as fatal.
    pub value: Option<serde_json::Value>,
    pub usage: Usage,
}

/// A named JSON schema handed to the completion service in structured mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredSpec {
    /// Schema name, also used to route scripted replies in tests.
    pub name: String,
    pub schema: serde_json::Value,
}

impl StructuredSpec {
    /// Derive the schema from `T`.
    pub fn of<T: JsonSchema>(name: impl Into<String>) -> Self {
        let schema = schemars::schema_for!(T);
        Self {
            name: name.into(),
            schema: serde_json::to_value(schema).unwrap_or_default(),
        }
    }
}

/// Errors from LLM gateway operations. All of these are Fatal-Abort for the
/// run or branch that issued the call.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("provider error: {message}")]
    Provider { message: String },

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("rate limited (retry after {retry_after_ms:?}ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}
