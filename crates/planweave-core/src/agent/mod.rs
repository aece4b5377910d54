//! Orchestration layer: planner, subtask loops, reflection, and the
//! top-level driver.
//!
//! - `prompts` -- prompt templates shared by the loops
//! - `planner` -- structured plan generation
//! - `reflection` -- completion verdicts over execution traces
//! - `subtask` -- the select/invoke/draft/reflect tool loop
//! - `coder` -- the generate/execute/review sandbox loop
//! - `orchestrator` -- plan → approval → fan-out → aggregate driver

pub mod coder;
pub mod orchestrator;
pub mod planner;
pub mod prompts;
pub mod reflection;
pub mod subtask;

pub use coder::{CodeTaskOrchestrator, CodeTaskRequest};
pub use orchestrator::{
    BranchExecutor, OrchestratorConfig, OrchestratorError, PlanningOrchestrator, PlanningOutcome,
};
pub use planner::Planner;
pub use reflection::ReflectionEvaluator;
pub use subtask::{SubtaskOrchestrator, SubtaskRequest};
