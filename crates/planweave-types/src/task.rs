//! Plan, subtask, and verdict records.
//!
//! These are the records that flow through the orchestration loops: the
//! structured plan the model produces, the per-round tool results, the
//! reflection verdicts that drive the retry loop, and the terminal outcome of
//! each subtask branch. The structured-output types derive `JsonSchema`; the
//! doc comments on their fields become the schema descriptions the model sees.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::llm::Usage;

/// Hard cap on reflect passes per subtask. Reaching it without a completed
/// verdict forces the deterministic fallback answer.
pub const MAX_RETRIES: u32 = 3;

/// Deterministic answer used when a subtask exhausts its retries.
pub fn fallback_answer(goal: &str) -> String {
    format!("{goal} could not be answered.")
}

// ---------------------------------------------------------------------------
// Structured model outputs
// ---------------------------------------------------------------------------

/// An ordered decomposition of the user's goal, produced by the planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Plan {
    /// Ordered list of subtasks that together answer the goal.
    pub subtasks: Vec<String>,
}

/// Verdict from a reflection pass over a subtask's draft answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ReflectionVerdict {
    /// When the verdict is negative: why, and what to change on the next
    /// attempt (different tool, different phrasing). Must not repeat earlier
    /// advice or overlap with other subtasks in the plan.
    pub advice: String,
    /// Whether the tool results and draft answer correctly satisfy the
    /// subtask.
    pub completed: bool,
}

/// A generated program for the code-execution loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Program {
    /// The condition under which the request counts as achieved.
    pub achievement_condition: String,
    /// Step-by-step plan the code follows.
    pub execution_plan: String,
    /// The code to execute.
    pub code: String,
}

/// Verdict from reviewing one code execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CodeReview {
    /// Objective statement of what the execution produced, followed by an
    /// assessment of whether it minimally satisfies the request, and a fix
    /// direction when it does not.
    pub observation: String,
    /// Whether the execution minimally satisfies the request.
    pub completed: bool,
}

// ---------------------------------------------------------------------------
// Accumulated records
// ---------------------------------------------------------------------------

/// One resolved tool invocation: what was called, with what, and what came
/// back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_name: String,
    /// Serialized JSON arguments as requested by the model.
    pub arguments: String,
    /// Structured result payload.
    pub results: Vec<serde_json::Value>,
}

/// Terminal outcome of one subtask branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtaskOutcome {
    /// The subtask goal this branch worked on.
    pub subtask: String,
    /// Position in the original plan. Aggregation sorts by this, never by
    /// arrival order.
    pub branch_index: usize,
    /// Whether the final reflection judged the answer complete.
    pub completed: bool,
    /// Number of reflect passes taken (1..=MAX_RETRIES).
    pub attempts: u32,
    /// Tool results, one inner list per select/invoke round.
    pub tool_results: Vec<Vec<ToolResult>>,
    /// Reflection verdicts, one per round.
    pub reflections: Vec<ReflectionVerdict>,
    /// Final answer text (the deterministic fallback on exhaustion).
    pub answer: String,
    /// Token usage accumulated across this branch's completion calls.
    #[serde(default)]
    pub usage: Usage,
}

/// Final report of one orchestrated run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRunReport {
    pub question: String,
    pub plan: Plan,
    /// Subtask outcomes in original plan order.
    pub subtasks: Vec<SubtaskOutcome>,
    pub answer: String,
    /// Branches recorded as degraded under the best-effort join policy.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branch_errors: Vec<serde_json::Value>,
    /// Token usage accumulated across the whole run.
    #[serde(default)]
    pub usage: Usage,
}
