//! The workflow executor: run/resume, fan-out barriers, checkpointing.
//!
//! Execution walks nodes from the entry along their outgoing edges. A
//! conditional edge may fan out into concurrent branches
//! (`tokio::task::JoinSet`), each running the branch node against a private
//! state clone; the barrier collects every branch before merging updates into
//! the parent state **in branch-index order**, so results are reproducible
//! under concurrency. A node may interrupt the run; the engine persists a
//! checkpoint and `resume` later continues from the suspended node's outgoing
//! edge -- earlier nodes are never replayed.
//!
//! A configurable step guard bounds cycles formed by conditional back-edges.
//! Cancellation is cooperative: the engine stops issuing node calls and
//! lets in-flight branches wind down through their own release paths before
//! returning.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use planweave_types::checkpoint::{Checkpoint, CheckpointError, PendingInterrupt};

use super::builder::WorkflowGraph;
use super::edge::{DispatchToken, Edge, EdgeTarget, END};
use super::node::{NodeContext, NodeError, Transition};
use super::state::{single, GraphState, StateError, StateSchema, StateUpdate, BRANCH_ERRORS_CHANNEL, RESUME_CHANNEL};
use crate::checkpoint::BoxCheckpointStore;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Default maximum number of node executions per run.
pub const DEFAULT_MAX_STEPS: u32 = 50;

/// What the barrier does when a branch fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinPolicy {
    /// The first failed branch fails the whole run. Remaining branches are
    /// cancelled cooperatively and drained before the error is returned.
    #[default]
    FailFast,
    /// A failed branch is recorded in the `branch_errors` channel; surviving
    /// branches merge normally.
    BestEffort,
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum node executions per `run`/`resume` call.
    pub max_steps: u32,
    pub join_policy: JoinPolicy,
    /// Cap on concurrently running branches per fan-out (None = one task per
    /// token).
    pub max_parallel_branches: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            join_policy: JoinPolicy::default(),
            max_parallel_branches: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome and errors
// ---------------------------------------------------------------------------

/// Result of driving a run as far as it can go.
#[derive(Debug)]
pub enum RunOutcome {
    /// The run reached the terminal; this is the final state.
    Finished(GraphState),
    /// A node interrupted the run. The checkpoint is persisted; call
    /// `resume` with a resume value to continue.
    Suspended { payload: serde_json::Value },
}

/// Errors from graph execution.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("unknown node: '{0}'")]
    UnknownNode(String),

    #[error("node '{0}' has no outgoing edge")]
    MissingEdge(String),

    #[error("step limit exceeded ({limit} steps)")]
    StepLimitExceeded { limit: u32 },

    #[error("node '{node}' failed: {source}")]
    Node { node: String, source: NodeError },

    #[error("branch {index} of '{node}' failed: {source}")]
    BranchFailed {
        node: String,
        index: usize,
        source: NodeError,
    },

    #[error("branch task join error: {0}")]
    Join(String),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("no checkpoint for thread '{0}'")]
    MissingCheckpoint(String),

    #[error("thread '{0}' is not suspended at an interrupt")]
    NoPendingInterrupt(String),

    #[error("run cancelled")]
    Cancelled,
}

// ---------------------------------------------------------------------------
// WorkflowEngine
// ---------------------------------------------------------------------------

/// Where the drive loop stands: about to execute a node, or about to follow
/// its outgoing edge (resume enters here so the suspended node is not
/// re-run).
enum Cursor {
    Run(String),
    Follow(String),
}

/// The DAG executor.
pub struct WorkflowEngine {
    graph: Arc<WorkflowGraph>,
    schema: Arc<StateSchema>,
    config: EngineConfig,
    checkpoints: Arc<BoxCheckpointStore>,
}

impl WorkflowEngine {
    pub fn new(
        graph: WorkflowGraph,
        schema: StateSchema,
        config: EngineConfig,
        checkpoints: Arc<BoxCheckpointStore>,
    ) -> Self {
        Self {
            graph: Arc::new(graph),
            schema: Arc::new(schema),
            config,
            checkpoints,
        }
    }

    /// Execute from the entry node with the given initial channels.
    pub async fn run(
        &self,
        initial: StateUpdate,
        thread_id: &str,
        cancel: CancellationToken,
    ) -> Result<RunOutcome, GraphError> {
        let mut state = GraphState::new(Arc::clone(&self.schema));
        state.apply(initial)?;

        let ctx = NodeContext::new(thread_id, cancel);
        tracing::info!(thread_id, run_id = %ctx.run_id(), "starting workflow run");
        self.drive(ctx, state, Cursor::Run(self.graph.entry().to_string()))
            .await
    }

    /// Continue a suspended run. The resume value is written to the reserved
    /// `resume` channel and execution continues from the suspended node's
    /// outgoing edge; earlier nodes are never replayed.
    pub async fn resume(
        &self,
        thread_id: &str,
        resume_value: serde_json::Value,
        cancel: CancellationToken,
    ) -> Result<RunOutcome, GraphError> {
        let checkpoint = self
            .checkpoints
            .get(thread_id)
            .await?
            .ok_or_else(|| GraphError::MissingCheckpoint(thread_id.to_string()))?;
        let pending = checkpoint
            .pending_interrupt
            .ok_or_else(|| GraphError::NoPendingInterrupt(thread_id.to_string()))?;

        let mut state = GraphState::from_value(Arc::clone(&self.schema), checkpoint.state)?;
        state.apply(single(RESUME_CHANNEL, resume_value))?;

        // The interrupt is consumed; clear it before continuing.
        self.persist(thread_id, &state, None).await?;

        let ctx = NodeContext::new(thread_id, cancel);
        tracing::info!(
            thread_id,
            run_id = %ctx.run_id(),
            node = pending.node_id.as_str(),
            "resuming workflow run"
        );
        self.drive(ctx, state, Cursor::Follow(pending.node_id)).await
    }

    async fn drive(
        &self,
        ctx: NodeContext,
        mut state: GraphState,
        start: Cursor,
    ) -> Result<RunOutcome, GraphError> {
        let mut steps: u32 = 0;
        let mut cursor = start;

        loop {
            match cursor {
                Cursor::Run(node_id) => {
                    if ctx.is_cancelled() {
                        return Err(GraphError::Cancelled);
                    }
                    steps += 1;
                    if steps > self.config.max_steps {
                        return Err(GraphError::StepLimitExceeded {
                            limit: self.config.max_steps,
                        });
                    }

                    let node = self
                        .graph
                        .node(&node_id)
                        .ok_or_else(|| GraphError::UnknownNode(node_id.clone()))?;

                    tracing::debug!(
                        thread_id = ctx.thread_id(),
                        node = node_id.as_str(),
                        step = steps,
                        "executing node"
                    );

                    // A failing node contributes nothing: the update is only
                    // applied on success.
                    let output = node.run(&ctx, &state).await.map_err(|source| {
                        GraphError::Node {
                            node: node_id.clone(),
                            source,
                        }
                    })?;
                    state.apply(output.update)?;

                    match output.transition {
                        Transition::Interrupt(payload) => {
                            self.persist(
                                ctx.thread_id(),
                                &state,
                                Some(PendingInterrupt {
                                    node_id: node_id.clone(),
                                    payload: payload.clone(),
                                }),
                            )
                            .await?;
                            tracing::info!(
                                thread_id = ctx.thread_id(),
                                node = node_id.as_str(),
                                "run suspended"
                            );
                            return Ok(RunOutcome::Suspended { payload });
                        }
                        Transition::Continue => {
                            self.persist(ctx.thread_id(), &state, None).await?;
                            cursor = Cursor::Follow(node_id);
                        }
                    }
                }
                Cursor::Follow(node_id) => {
                    let edge = self
                        .graph
                        .edge(&node_id)
                        .ok_or_else(|| GraphError::MissingEdge(node_id.clone()))?;

                    let target = match edge {
                        Edge::Static(to) if to.as_str() == END => EdgeTarget::End,
                        Edge::Static(to) => EdgeTarget::Node(to.clone()),
                        Edge::Conditional(route) => route(&state),
                    };

                    match target {
                        EdgeTarget::End => {
                            tracing::info!(thread_id = ctx.thread_id(), "workflow run finished");
                            return Ok(RunOutcome::Finished(state));
                        }
                        EdgeTarget::Node(next) => cursor = Cursor::Run(next),
                        EdgeTarget::Dispatch {
                            node,
                            join,
                            branches,
                        } => {
                            self.fan_out(&ctx, &mut state, &node, branches).await?;
                            self.persist(ctx.thread_id(), &state, None).await?;
                            cursor = Cursor::Run(join);
                        }
                    }
                }
            }
        }
    }

    /// Execute one token per branch concurrently and barrier-join: every
    /// branch reports before anything merges, and merging happens in
    /// branch-index order so the aggregate is independent of completion
    /// order.
    async fn fan_out(
        &self,
        ctx: &NodeContext,
        state: &mut GraphState,
        node_id: &str,
        branches: Vec<DispatchToken>,
    ) -> Result<(), GraphError> {
        if self.graph.node(node_id).is_none() {
            return Err(GraphError::UnknownNode(node_id.to_string()));
        }

        tracing::debug!(
            thread_id = ctx.thread_id(),
            node = node_id,
            branches = branches.len(),
            "dispatching fan-out"
        );

        let branch_cancel = ctx.cancellation().child_token();
        let semaphore = self
            .config
            .max_parallel_branches
            .map(|cap| Arc::new(Semaphore::new(cap)));

        let mut join_set: JoinSet<(usize, Result<StateUpdate, NodeError>)> = JoinSet::new();

        for token in branches {
            let mut branch_state = state.clone();
            branch_state.apply(token.seed)?;

            let graph = Arc::clone(&self.graph);
            let node_id = node_id.to_string();
            let branch_ctx = ctx.branch(token.branch_index, branch_cancel.clone());
            let semaphore = semaphore.clone();
            let index = token.branch_index;

            join_set.spawn(async move {
                let _permit = match semaphore {
                    Some(semaphore) => match semaphore.acquire_owned().await {
                        Ok(permit) => Some(permit),
                        Err(_) => return (index, Err(NodeError::Cancelled)),
                    },
                    None => None,
                };
                if branch_ctx.is_cancelled() {
                    return (index, Err(NodeError::Cancelled));
                }
                let Some(node) = graph.node(&node_id) else {
                    return (
                        index,
                        Err(NodeError::Other(format!("unknown node '{node_id}'"))),
                    );
                };
                let result = node
                    .run(&branch_ctx, &branch_state)
                    .await
                    .map(|output| output.update);
                (index, result)
            });
        }

        // Barrier: drain every branch before touching parent state. Under
        // fail-fast the remaining branches are cancelled cooperatively but
        // still drained, so their release paths run.
        let mut outcomes: Vec<(usize, Result<StateUpdate, NodeError>)> = Vec::new();
        let mut fail_fast_triggered = false;
        let mut join_failure: Option<String> = None;

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, result)) => {
                    if result.is_err()
                        && self.config.join_policy == JoinPolicy::FailFast
                        && !fail_fast_triggered
                    {
                        fail_fast_triggered = true;
                        branch_cancel.cancel();
                    }
                    outcomes.push((index, result));
                }
                Err(join_err) => {
                    // A panicked branch is a bug, not a policy matter.
                    if join_failure.is_none() {
                        join_failure = Some(join_err.to_string());
                        branch_cancel.cancel();
                    }
                }
            }
        }

        if ctx.is_cancelled() {
            return Err(GraphError::Cancelled);
        }
        if let Some(message) = join_failure {
            return Err(GraphError::Join(message));
        }

        // Merge in branch-index order, never arrival order.
        outcomes.sort_by_key(|(index, _)| *index);
        for (index, result) in outcomes {
            match result {
                Ok(update) => state.apply(update)?,
                // Collateral cancellation after a fail-fast trigger is not
                // that branch's own failure.
                Err(NodeError::Cancelled) if fail_fast_triggered => {}
                Err(source) => match self.config.join_policy {
                    JoinPolicy::FailFast => {
                        return Err(GraphError::BranchFailed {
                            node: node_id.to_string(),
                            index,
                            source,
                        });
                    }
                    JoinPolicy::BestEffort => {
                        tracing::warn!(
                            thread_id = ctx.thread_id(),
                            node = node_id,
                            index,
                            error = %source,
                            "branch failed; recording degraded outcome"
                        );
                        state.apply(single(
                            BRANCH_ERRORS_CHANNEL,
                            json!({
                                "index": index,
                                "node": node_id,
                                "error": source.to_string(),
                            }),
                        ))?;
                    }
                },
            }
        }

        Ok(())
    }

    async fn persist(
        &self,
        thread_id: &str,
        state: &GraphState,
        pending_interrupt: Option<PendingInterrupt>,
    ) -> Result<(), GraphError> {
        let checkpoint = Checkpoint {
            thread_id: thread_id.to_string(),
            state: state.to_value(),
            pending_interrupt,
            updated_at: Utc::now(),
        };
        self.checkpoints.put(&checkpoint).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::MemoryCheckpointStore;
    use crate::graph::builder::GraphBuilder;
    use crate::graph::node::{Node, NodeOutput};
    use crate::graph::state::Reducer;
    use serde_json::Value;
    use std::time::Duration;

    // -----------------------------------------------------------------------
    // Test nodes
    // -----------------------------------------------------------------------

    /// Writes a constant to a channel.
    struct Put(&'static str, Value);

    impl Node for Put {
        async fn run(
            &self,
            _ctx: &NodeContext,
            _state: &GraphState,
        ) -> Result<NodeOutput, NodeError> {
            Ok(NodeOutput::advance(single(self.0, self.1.clone())))
        }
    }

    /// Appends its branch index to `hits`, sleeping so that higher indices
    /// finish first.
    struct SlowBranch;

    impl Node for SlowBranch {
        async fn run(
            &self,
            ctx: &NodeContext,
            _state: &GraphState,
        ) -> Result<NodeOutput, NodeError> {
            let index = ctx.branch_index().unwrap_or_default();
            tokio::time::sleep(Duration::from_millis(30 * (3 - index as u64))).await;
            Ok(NodeOutput::advance(single("hits", json!(index))))
        }
    }

    /// Fails on a chosen branch index, succeeds elsewhere.
    struct FlakyBranch {
        failing_index: usize,
    }

    impl Node for FlakyBranch {
        async fn run(
            &self,
            ctx: &NodeContext,
            _state: &GraphState,
        ) -> Result<NodeOutput, NodeError> {
            let index = ctx.branch_index().unwrap_or_default();
            if index == self.failing_index {
                Err(NodeError::Other("branch exploded".to_string()))
            } else {
                Ok(NodeOutput::advance(single("hits", json!(index))))
            }
        }
    }

    /// Suspends with a fixed payload.
    struct Gate;

    impl Node for Gate {
        async fn run(
            &self,
            _ctx: &NodeContext,
            state: &GraphState,
        ) -> Result<NodeOutput, NodeError> {
            let plan = state.get("plan").cloned().unwrap_or(Value::Null);
            Ok(NodeOutput::interrupt(StateUpdate::new(), json!({ "plan": plan })))
        }
    }

    struct Fail;

    impl Node for Fail {
        async fn run(
            &self,
            _ctx: &NodeContext,
            _state: &GraphState,
        ) -> Result<NodeOutput, NodeError> {
            Err(NodeError::Other("node exploded".to_string()))
        }
    }

    struct Noop;

    impl Node for Noop {
        async fn run(
            &self,
            _ctx: &NodeContext,
            _state: &GraphState,
        ) -> Result<NodeOutput, NodeError> {
            Ok(NodeOutput::noop())
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn schema() -> StateSchema {
        StateSchema::new()
            .channel("plan", Reducer::Replace)
            .channel("answer", Reducer::Replace)
            .channel("hits", Reducer::Append)
    }

    fn store() -> Arc<BoxCheckpointStore> {
        Arc::new(BoxCheckpointStore::new(MemoryCheckpointStore::new()))
    }

    fn engine(graph: WorkflowGraph, config: EngineConfig) -> WorkflowEngine {
        WorkflowEngine::new(graph, schema(), config, store())
    }

    fn finished(outcome: RunOutcome) -> GraphState {
        match outcome {
            RunOutcome::Finished(state) => state,
            RunOutcome::Suspended { .. } => panic!("expected finished run"),
        }
    }

    fn fan_out_graph<T: Node + 'static>(branch: T) -> WorkflowGraph {
        GraphBuilder::new()
            .node("seed", Put("plan", json!(["a", "b", "c"])))
            .node("branch", branch)
            .node("join", Put("answer", json!("joined")))
            .conditional_edge("seed", |_state| EdgeTarget::Dispatch {
                node: "branch".to_string(),
                join: "join".to_string(),
                branches: (0..3).map(|i| DispatchToken::new(i, StateUpdate::new())).collect(),
            })
            .edge("join", END)
            .entry("seed")
            .build()
            .unwrap()
    }

    // -----------------------------------------------------------------------
    // Sequential execution
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_linear_run_reaches_end() {
        let graph = GraphBuilder::new()
            .node("a", Put("plan", json!(["x"])))
            .node("b", Put("answer", json!("done")))
            .edge("a", "b")
            .edge("b", END)
            .entry("a")
            .build()
            .unwrap();

        let engine = engine(graph, EngineConfig::default());
        let outcome = engine
            .run(StateUpdate::new(), "t1", CancellationToken::new())
            .await
            .unwrap();
        let state = finished(outcome);
        assert_eq!(state.get_str("answer"), Some("done"));
    }

    #[tokio::test]
    async fn test_node_failure_propagates_with_node_name() {
        let graph = GraphBuilder::new()
            .node("a", Fail)
            .edge("a", END)
            .entry("a")
            .build()
            .unwrap();

        let engine = engine(graph, EngineConfig::default());
        let err = engine
            .run(StateUpdate::new(), "t1", CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            GraphError::Node { node, .. } => assert_eq!(node, "a"),
            other => panic!("expected node error, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_step_limit_bounds_conditional_cycle() {
        // plan -> review -> plan -> ... forever, bounded by max_steps.
        let graph = GraphBuilder::new()
            .node("plan", Noop)
            .node("review", Noop)
            .edge("plan", "review")
            .conditional_edge("review", |_state| EdgeTarget::Node("plan".to_string()))
            .entry("plan")
            .build()
            .unwrap();

        let engine = engine(
            graph,
            EngineConfig {
                max_steps: 7,
                ..EngineConfig::default()
            },
        );
        let err = engine
            .run(StateUpdate::new(), "t1", CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::StepLimitExceeded { limit: 7 }));
    }

    // -----------------------------------------------------------------------
    // Fan-out / barrier
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_fan_out_merges_in_index_order() {
        // Branch 0 is the slowest; the merged order must still be 0, 1, 2.
        let engine = engine(fan_out_graph(SlowBranch), EngineConfig::default());
        let state = finished(
            engine
                .run(StateUpdate::new(), "t1", CancellationToken::new())
                .await
                .unwrap(),
        );
        assert_eq!(state.get("hits").unwrap(), &json!([0, 1, 2]));
        assert_eq!(state.get_str("answer"), Some("joined"));
    }

    #[tokio::test]
    async fn test_empty_dispatch_joins_immediately() {
        let graph = GraphBuilder::new()
            .node("seed", Noop)
            .node("branch", SlowBranch)
            .node("join", Put("answer", json!("joined")))
            .conditional_edge("seed", |_state| EdgeTarget::Dispatch {
                node: "branch".to_string(),
                join: "join".to_string(),
                branches: vec![],
            })
            .edge("join", END)
            .entry("seed")
            .build()
            .unwrap();

        let engine = engine(graph, EngineConfig::default());
        let state = finished(
            engine
                .run(StateUpdate::new(), "t1", CancellationToken::new())
                .await
                .unwrap(),
        );
        assert_eq!(state.get_str("answer"), Some("joined"));
        assert!(state.get("hits").is_none());
    }

    #[tokio::test]
    async fn test_fail_fast_branch_fails_run() {
        let engine = engine(
            fan_out_graph(FlakyBranch { failing_index: 1 }),
            EngineConfig::default(),
        );
        let err = engine
            .run(StateUpdate::new(), "t1", CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            GraphError::BranchFailed { node, index, .. } => {
                assert_eq!(node, "branch");
                assert_eq!(index, 1);
            }
            other => panic!("expected branch failure, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_best_effort_records_degraded_branch() {
        let engine = engine(
            fan_out_graph(FlakyBranch { failing_index: 1 }),
            EngineConfig {
                join_policy: JoinPolicy::BestEffort,
                ..EngineConfig::default()
            },
        );
        let state = finished(
            engine
                .run(StateUpdate::new(), "t1", CancellationToken::new())
                .await
                .unwrap(),
        );
        // Siblings unaffected, failure recorded as data.
        assert_eq!(state.get("hits").unwrap(), &json!([0, 2]));
        let errors = state.get(BRANCH_ERRORS_CHANNEL).unwrap();
        assert_eq!(errors[0]["index"], json!(1));
        assert!(errors[0]["error"].as_str().unwrap().contains("exploded"));
    }

    #[tokio::test]
    async fn test_max_parallel_branches_cap_still_completes_all() {
        let engine = engine(
            fan_out_graph(SlowBranch),
            EngineConfig {
                max_parallel_branches: Some(1),
                ..EngineConfig::default()
            },
        );
        let state = finished(
            engine
                .run(StateUpdate::new(), "t1", CancellationToken::new())
                .await
                .unwrap(),
        );
        assert_eq!(state.get("hits").unwrap(), &json!([0, 1, 2]));
    }

    // -----------------------------------------------------------------------
    // Suspend / resume
    // -----------------------------------------------------------------------

    fn approval_graph() -> WorkflowGraph {
        GraphBuilder::new()
            .node("plan", Put("plan", json!(["a", "b"])))
            .node("gate", Gate)
            .node("execute", Put("answer", json!("executed")))
            .edge("plan", "gate")
            .conditional_edge("gate", |state| {
                if state.get_str(RESUME_CHANNEL) == Some("approve") {
                    EdgeTarget::Node("execute".to_string())
                } else {
                    EdgeTarget::Node("plan".to_string())
                }
            })
            .edge("execute", END)
            .entry("plan")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_suspend_surfaces_payload_and_resume_approves() {
        let engine = engine(approval_graph(), EngineConfig::default());

        let outcome = engine
            .run(StateUpdate::new(), "t1", CancellationToken::new())
            .await
            .unwrap();
        let RunOutcome::Suspended { payload } = outcome else {
            panic!("expected suspension");
        };
        assert_eq!(payload["plan"], json!(["a", "b"]));

        let state = finished(
            engine
                .resume("t1", json!("approve"), CancellationToken::new())
                .await
                .unwrap(),
        );
        // Same plan that was suspended; gate was not re-run.
        assert_eq!(state.get("plan").unwrap(), &json!(["a", "b"]));
        assert_eq!(state.get_str("answer"), Some("executed"));
    }

    #[tokio::test]
    async fn test_resume_rejection_routes_back_to_plan() {
        let engine = engine(approval_graph(), EngineConfig::default());
        engine
            .run(StateUpdate::new(), "t1", CancellationToken::new())
            .await
            .unwrap();

        // Anything but "approve" regenerates the plan and suspends again.
        let outcome = engine
            .resume("t1", json!("no thanks"), CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(outcome, RunOutcome::Suspended { .. }));
    }

    #[tokio::test]
    async fn test_resume_without_checkpoint_is_fatal() {
        let engine = engine(approval_graph(), EngineConfig::default());
        let err = engine
            .resume("missing", json!("approve"), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::MissingCheckpoint(_)));
    }

    #[tokio::test]
    async fn test_resume_after_finish_is_not_suspended() {
        let engine = engine(approval_graph(), EngineConfig::default());
        engine
            .run(StateUpdate::new(), "t1", CancellationToken::new())
            .await
            .unwrap();
        engine
            .resume("t1", json!("approve"), CancellationToken::new())
            .await
            .unwrap();

        let err = engine
            .resume("t1", json!("approve"), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::NoPendingInterrupt(_)));
    }

    // -----------------------------------------------------------------------
    // Cancellation
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_pre_cancelled_run_issues_no_node_calls() {
        let engine = engine(approval_graph(), EngineConfig::default());
        let token = CancellationToken::new();
        token.cancel();
        let err = engine
            .run(StateUpdate::new(), "t1", token)
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::Cancelled));
    }

    #[tokio::test]
    async fn test_cancellation_during_fan_out() {
        let engine = engine(fan_out_graph(SlowBranch), EngineConfig::default());
        let token = CancellationToken::new();
        let cancel_after = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel_after.cancel();
        });
        let err = engine.run(StateUpdate::new(), "t1", token).await.unwrap_err();
        assert!(matches!(err, GraphError::Cancelled));
    }
}
