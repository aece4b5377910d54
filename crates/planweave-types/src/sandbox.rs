//! Sandbox execution records.
//!
//! A sandbox is an external, isolated environment that executes generated
//! code. A runtime error inside the sandbox is captured in
//! [`CodeExecution::error`] -- never raised -- so it can feed the next review
//! cycle of the code loop.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque handle to a provisioned sandbox environment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SandboxHandle(pub String);

impl SandboxHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One artifact produced by a code execution (a rendered chart, a table, raw
/// text output).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionArtifact {
    /// Artifact kind, e.g. "png" or "raw".
    pub kind: String,
    pub content: String,
}

/// Captured result of running code in a sandbox.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodeExecution {
    pub stdout: String,
    pub stderr: String,
    /// Runtime error traceback, if the code raised. Structured data, not an
    /// `Err`: it feeds the next review cycle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub results: Vec<ExecutionArtifact>,
}

impl CodeExecution {
    /// Whether the execution raised inside the sandbox.
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

/// One generate/execute/review round of the code loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeThread {
    pub code: String,
    pub stdout: String,
    pub stderr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Review observation for this round, once reviewed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation: Option<String>,
    pub completed: bool,
    #[serde(default)]
    pub results: Vec<ExecutionArtifact>,
}

/// Terminal outcome of one code-loop subtask.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeTaskOutcome {
    pub request: String,
    pub completed: bool,
    /// Number of review passes taken (1..=MAX_RETRIES).
    pub attempts: u32,
    /// All rounds, in execution order.
    pub threads: Vec<CodeThread>,
    /// Final observation (the deterministic fallback on exhaustion).
    pub answer: String,
    /// Token usage accumulated across this loop's completion calls.
    #[serde(default)]
    pub usage: crate::llm::Usage,
}

/// Errors from the sandbox execution service. These cover provisioning and
/// transport only -- in-sandbox runtime errors are data, not errors.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("sandbox service error: {message}")]
    Service { message: String },

    #[error("sandbox transport error: {0}")]
    Transport(String),

    #[error("sandbox protocol error: {0}")]
    Protocol(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_failed_flag() {
        let ok = CodeExecution {
            stdout: "42".to_string(),
            ..CodeExecution::default()
        };
        assert!(!ok.failed());

        let raised = CodeExecution {
            error: Some("ZeroDivisionError".to_string()),
            ..CodeExecution::default()
        };
        assert!(raised.failed());
    }

    #[test]
    fn test_code_execution_serde_defaults() {
        let parsed: CodeExecution =
            serde_json::from_str(r#"{"stdout":"hi","stderr":""}"#).unwrap();
        assert!(parsed.error.is_none());
        assert!(parsed.results.is_empty());
    }
}
