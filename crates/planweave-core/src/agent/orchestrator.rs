//! The top-level driver: plan → approval interrupt → fan-out → aggregate.
//!
//! Composes the workflow engine with a branch executor into the full
//! pipeline. `create_plan` produces the ordered subtask list; `approve_plan`
//! suspends the run with the plan as payload (the system's only unbounded
//! suspension); resuming with `"approve"` dispatches one concurrent branch
//! per subtask, any other token regenerates the plan. The barrier merges
//! branch outcomes in plan order and `create_answer` synthesizes the final
//! result.

use std::future::Future;
use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use planweave_types::llm::Usage;
use planweave_types::message::Message;
use planweave_types::task::{AgentRunReport, Plan, ReflectionVerdict, SubtaskOutcome};

use crate::checkpoint::BoxCheckpointStore;
use crate::graph::state::{single, BRANCH_ERRORS_CHANNEL, RESUME_CHANNEL};
use crate::graph::{
    DispatchToken, EdgeTarget, EngineConfig, GraphBuildError, GraphBuilder, GraphError,
    GraphState, JoinPolicy, Node, NodeContext, NodeError, NodeOutput, Reducer, RunOutcome,
    StateSchema, StateUpdate, WorkflowEngine, END,
};
use crate::llm::BoxLlmGateway;

use super::coder::{CodeTaskOrchestrator, CodeTaskRequest};
use super::planner::Planner;
use super::prompts::AgentPrompts;
use super::subtask::{SubtaskOrchestrator, SubtaskRequest};

// ---------------------------------------------------------------------------
// Channels and node ids
// ---------------------------------------------------------------------------

const QUESTION: &str = "question";
const PLAN: &str = "plan";
const SUBTASK: &str = "subtask";
const SUBTASK_RESULTS: &str = "subtask_results";
const USAGE: &str = "usage";
const FINAL_ANSWER: &str = "final_answer";

const CREATE_PLAN: &str = "create_plan";
const APPROVE_PLAN: &str = "approve_plan";
const EXECUTE_SUBTASK: &str = "execute_subtask";
const CREATE_ANSWER: &str = "create_answer";

/// The resume token that routes to execution; anything else regenerates the
/// plan.
pub const APPROVE_TOKEN: &str = "approve";

// ---------------------------------------------------------------------------
// BranchExecutor seam
// ---------------------------------------------------------------------------

/// Executes one fan-out branch to a terminal [`SubtaskOutcome`].
///
/// The tool loop and the sandbox code loop both plug in here, so the same
/// pipeline drives help-desk style research and data-analysis runs.
pub trait BranchExecutor: Send + Sync {
    fn execute(
        &self,
        ctx: &NodeContext,
        request: &SubtaskRequest,
    ) -> impl Future<Output = Result<SubtaskOutcome, NodeError>> + Send;
}

impl BranchExecutor for SubtaskOrchestrator {
    fn execute(
        &self,
        ctx: &NodeContext,
        request: &SubtaskRequest,
    ) -> impl Future<Output = Result<SubtaskOutcome, NodeError>> + Send {
        self.run(ctx, request)
    }
}

impl BranchExecutor for CodeTaskOrchestrator {
    /// Adapt the code loop to the branch seam: the overall question carries
    /// the data description, the subtask is the analysis request, and each
    /// review round maps onto a reflection verdict.
    async fn execute(
        &self,
        ctx: &NodeContext,
        request: &SubtaskRequest,
    ) -> Result<SubtaskOutcome, NodeError> {
        let code_request = CodeTaskRequest {
            data_info: request.question.clone(),
            request: request.subtask.clone(),
        };
        let outcome = self.run(ctx, &code_request).await?;
        Ok(SubtaskOutcome {
            subtask: request.subtask.clone(),
            branch_index: request.branch_index,
            completed: outcome.completed,
            attempts: outcome.attempts,
            tool_results: Vec::new(),
            reflections: outcome
                .threads
                .iter()
                .map(|thread| ReflectionVerdict {
                    advice: thread.observation.clone().unwrap_or_default(),
                    completed: thread.completed,
                })
                .collect(),
            answer: outcome.answer,
            usage: outcome.usage,
        })
    }
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

struct PlanNode {
    planner: Planner,
}

impl Node for PlanNode {
    async fn run(&self, ctx: &NodeContext, state: &GraphState) -> Result<NodeOutput, NodeError> {
        ctx.ensure_active()?;
        let question = state.get_str(QUESTION).unwrap_or_default();
        let (plan, usage) = self.planner.create_plan(question).await?;

        let mut update = StateUpdate::new();
        update.insert(PLAN.to_string(), json!(plan.subtasks));
        update.insert(USAGE.to_string(), json!(usage));
        Ok(NodeOutput::advance(update))
    }
}

/// The plan-review gate: suspends the run with the current plan as payload.
struct ApprovePlanNode;

impl Node for ApprovePlanNode {
    async fn run(&self, _ctx: &NodeContext, state: &GraphState) -> Result<NodeOutput, NodeError> {
        let plan = state.get(PLAN).cloned().unwrap_or_else(|| json!([]));
        Ok(NodeOutput::interrupt(
            StateUpdate::new(),
            json!({ "plan": plan }),
        ))
    }
}

struct SubtaskNode<E> {
    executor: Arc<E>,
}

impl<E: BranchExecutor + 'static> Node for SubtaskNode<E> {
    async fn run(&self, ctx: &NodeContext, state: &GraphState) -> Result<NodeOutput, NodeError> {
        let request = SubtaskRequest {
            question: state.get_str(QUESTION).unwrap_or_default().to_string(),
            plan: state
                .get(PLAN)
                .and_then(|value| serde_json::from_value(value.clone()).ok())
                .unwrap_or_default(),
            subtask: state.get_str(SUBTASK).unwrap_or_default().to_string(),
            branch_index: ctx.branch_index().unwrap_or_default(),
        };

        let outcome = self.executor.execute(ctx, &request).await?;
        let outcome_json =
            serde_json::to_value(&outcome).map_err(|e| NodeError::Parse(e.to_string()))?;
        Ok(NodeOutput::advance(single(SUBTASK_RESULTS, outcome_json)))
    }
}

struct AggregateNode {
    gateway: Arc<BoxLlmGateway>,
    prompts: AgentPrompts,
}

impl Node for AggregateNode {
    async fn run(&self, ctx: &NodeContext, state: &GraphState) -> Result<NodeOutput, NodeError> {
        ctx.ensure_active()?;
        let question = state.get_str(QUESTION).unwrap_or_default();
        let outcomes: Vec<SubtaskOutcome> = state
            .get(SUBTASK_RESULTS)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or_default();

        let pairs: Vec<(String, String)> = outcomes
            .into_iter()
            .map(|outcome| (outcome.subtask, outcome.answer))
            .collect();
        let pairs_json =
            serde_json::to_string(&pairs).map_err(|e| NodeError::Parse(e.to_string()))?;

        let conversation = vec![
            Message::system(self.prompts.final_answer_system()),
            Message::user(self.prompts.final_answer_user(question, &pairs_json)),
        ];
        let outcome = self.gateway.complete(&conversation, &[]).await?;

        let mut update = StateUpdate::new();
        update.insert(
            FINAL_ANSWER.to_string(),
            json!(outcome.content.unwrap_or_default()),
        );
        update.insert(USAGE.to_string(), json!(outcome.usage));
        Ok(NodeOutput::advance(update))
    }
}

// ---------------------------------------------------------------------------
// PlanningOrchestrator
// ---------------------------------------------------------------------------

/// Configuration for the planning pipeline.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    pub join_policy: JoinPolicy,
    /// Cap on concurrently running subtask branches (None = one task per
    /// subtask).
    pub max_parallel_branches: Option<usize>,
    /// Override for the engine's step guard (None = engine default).
    pub max_steps: Option<u32>,
}

/// What a `start`/`resume` call yields.
#[derive(Debug)]
pub enum PlanningOutcome {
    /// The run is suspended at the plan-review gate. Surface the plan to a
    /// human and call `resume` with their decision.
    AwaitingApproval { plan: Plan },
    /// The run reached the terminal.
    Finished(AgentRunReport),
}

/// Errors from driving the planning pipeline.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// The run's state no longer matches the pipeline's shape.
    #[error("malformed run state: {0}")]
    Malformed(String),
}

/// Top-level driver composing the engine and a branch executor.
pub struct PlanningOrchestrator {
    engine: WorkflowEngine,
}

impl PlanningOrchestrator {
    pub fn new<E: BranchExecutor + 'static>(
        gateway: Arc<BoxLlmGateway>,
        executor: Arc<E>,
        checkpoints: Arc<BoxCheckpointStore>,
        config: OrchestratorConfig,
    ) -> Result<Self, GraphBuildError> {
        let schema = StateSchema::new()
            .channel(QUESTION, Reducer::Replace)
            .channel(PLAN, Reducer::Replace)
            .channel(SUBTASK, Reducer::Replace)
            .channel(SUBTASK_RESULTS, Reducer::Append)
            .channel(USAGE, Reducer::Append)
            .channel(FINAL_ANSWER, Reducer::Replace);

        let graph = GraphBuilder::new()
            .node(
                CREATE_PLAN,
                PlanNode {
                    planner: Planner::new(Arc::clone(&gateway)),
                },
            )
            .node(APPROVE_PLAN, ApprovePlanNode)
            .node(EXECUTE_SUBTASK, SubtaskNode { executor })
            .node(
                CREATE_ANSWER,
                AggregateNode {
                    gateway,
                    prompts: AgentPrompts,
                },
            )
            .edge(CREATE_PLAN, APPROVE_PLAN)
            .conditional_edge(APPROVE_PLAN, route_approval)
            .edge(CREATE_ANSWER, END)
            .entry(CREATE_PLAN)
            .build()?;

        let mut engine_config = EngineConfig {
            join_policy: config.join_policy,
            max_parallel_branches: config.max_parallel_branches,
            ..EngineConfig::default()
        };
        if let Some(max_steps) = config.max_steps {
            engine_config.max_steps = max_steps;
        }

        Ok(Self {
            engine: WorkflowEngine::new(graph, schema, engine_config, checkpoints),
        })
    }

    /// Start a run. It suspends at the plan-review gate.
    pub async fn start(
        &self,
        question: &str,
        thread_id: &str,
        cancel: CancellationToken,
    ) -> Result<PlanningOutcome, OrchestratorError> {
        let outcome = self
            .engine
            .run(single(QUESTION, json!(question)), thread_id, cancel)
            .await?;
        Self::interpret(outcome)
    }

    /// Feed the human decision back into a suspended run. `"approve"` routes
    /// to execution; anything else regenerates the plan and suspends again.
    pub async fn resume(
        &self,
        thread_id: &str,
        decision: &str,
        cancel: CancellationToken,
    ) -> Result<PlanningOutcome, OrchestratorError> {
        let outcome = self
            .engine
            .resume(thread_id, json!(decision), cancel)
            .await?;
        Self::interpret(outcome)
    }

    fn interpret(outcome: RunOutcome) -> Result<PlanningOutcome, OrchestratorError> {
        match outcome {
            RunOutcome::Suspended { payload } => {
                let subtasks: Vec<String> = payload
                    .get("plan")
                    .and_then(|value| serde_json::from_value(value.clone()).ok())
                    .ok_or_else(|| {
                        OrchestratorError::Malformed(
                            "suspension payload carries no plan".to_string(),
                        )
                    })?;
                Ok(PlanningOutcome::AwaitingApproval {
                    plan: Plan { subtasks },
                })
            }
            RunOutcome::Finished(state) => Ok(PlanningOutcome::Finished(Self::report(&state)?)),
        }
    }

    /// Assemble the final report from the terminal state. Subtask outcomes
    /// arrive already in plan order -- the barrier merged them by branch
    /// index.
    fn report(state: &GraphState) -> Result<AgentRunReport, OrchestratorError> {
        let question = state.get_str(QUESTION).unwrap_or_default().to_string();
        let subtasks: Vec<String> = state
            .get(PLAN)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .ok_or_else(|| OrchestratorError::Malformed("plan channel missing".to_string()))?;
        let outcomes: Vec<SubtaskOutcome> = match state.get(SUBTASK_RESULTS) {
            Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
                OrchestratorError::Malformed(format!("subtask results unreadable: {e}"))
            })?,
            None => Vec::new(),
        };
        let answer = state.get_str(FINAL_ANSWER).unwrap_or_default().to_string();
        let branch_errors: Vec<serde_json::Value> = state
            .get(BRANCH_ERRORS_CHANNEL)
            .and_then(|value| value.as_array().cloned())
            .unwrap_or_default();

        let mut usage = Usage::default();
        if let Some(entries) = state.get(USAGE).and_then(|value| value.as_array()) {
            for entry in entries {
                if let Ok(call_usage) = serde_json::from_value::<Usage>(entry.clone()) {
                    usage.absorb(call_usage);
                }
            }
        }
        for outcome in &outcomes {
            usage.absorb(outcome.usage);
        }

        Ok(AgentRunReport {
            question,
            plan: Plan { subtasks },
            subtasks: outcomes,
            answer,
            branch_errors,
            usage,
        })
    }
}

/// Route out of the plan-review gate based on the resume token.
fn route_approval(state: &GraphState) -> EdgeTarget {
    if state.get_str(RESUME_CHANNEL) == Some(APPROVE_TOKEN) {
        let subtasks: Vec<String> = state
            .get(PLAN)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or_default();
        let branches = subtasks
            .iter()
            .enumerate()
            .map(|(index, goal)| DispatchToken::new(index, single(SUBTASK, json!(goal))))
            .collect();
        EdgeTarget::Dispatch {
            node: EXECUTE_SUBTASK.to_string(),
            join: CREATE_ANSWER.to_string(),
            branches,
        }
    } else {
        EdgeTarget::Node(CREATE_PLAN.to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
