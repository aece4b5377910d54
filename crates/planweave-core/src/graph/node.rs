//! The `Node` trait and its object-safe boxed form.
//!
//! A node is a named unit of work: a pure function of state to a partial
//! update, possibly asynchronous. Nodes never mutate state directly; the
//! engine merges their updates through the channel reducers. A node that
//! fails contributes nothing -- no partial update is applied.
//!
//! `Node` uses native async fn in traits (RPITIT). Since that is not
//! dyn-compatible, [`BoxNode`] wraps any node behind the object-safe
//! [`NodeDyn`] trait via a blanket impl, the same pattern the gateway and
//! tool ports use.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use planweave_types::llm::LlmError;
use planweave_types::sandbox::SandboxError;
use planweave_types::tool::ToolError;

use super::state::{GraphState, StateError, StateUpdate};

// ---------------------------------------------------------------------------
// NodeContext
// ---------------------------------------------------------------------------

/// Execution context threaded through every node call: the run's thread id,
/// the branch index when running inside a fan-out, and the cooperative
/// cancellation token.
#[derive(Debug, Clone)]
pub struct NodeContext {
    thread_id: String,
    /// Identifies one `run`/`resume` invocation in the logs; a resumed
    /// thread gets a fresh run id.
    run_id: Uuid,
    branch_index: Option<usize>,
    cancel: CancellationToken,
}

impl NodeContext {
    pub fn new(thread_id: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            thread_id: thread_id.into(),
            run_id: Uuid::now_v7(),
            branch_index: None,
            cancel,
        }
    }

    /// Derive the context for one fan-out branch.
    pub fn branch(&self, branch_index: usize, cancel: CancellationToken) -> Self {
        Self {
            thread_id: self.thread_id.clone(),
            run_id: self.run_id,
            branch_index: Some(branch_index),
            cancel,
        }
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn branch_index(&self) -> Option<usize> {
        self.branch_index
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token the engine derives branch tokens from.
    pub(crate) fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fail fast when the run has been cancelled. Nodes call this between
    /// suspension points so abandoned runs stop issuing external calls.
    pub fn ensure_active(&self) -> Result<(), NodeError> {
        if self.cancel.is_cancelled() {
            Err(NodeError::Cancelled)
        } else {
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// NodeOutput
// ---------------------------------------------------------------------------

/// What happens after a node's update is applied.
#[derive(Debug, Clone)]
pub enum Transition {
    /// Follow the node's outgoing edge.
    Continue,
    /// Persist a checkpoint with this payload and return control to the
    /// caller. `resume` later continues from this node's outgoing edge.
    Interrupt(Value),
}

/// A node's result: a partial state update plus the transition to take.
#[derive(Debug, Clone)]
pub struct NodeOutput {
    pub update: StateUpdate,
    pub transition: Transition,
}

impl NodeOutput {
    /// Apply `update` and continue along the outgoing edge.
    pub fn advance(update: StateUpdate) -> Self {
        Self {
            update,
            transition: Transition::Continue,
        }
    }

    /// Continue with no state change.
    pub fn noop() -> Self {
        Self::advance(StateUpdate::new())
    }

    /// Apply `update`, then suspend the run with `payload`.
    pub fn interrupt(update: StateUpdate, payload: Value) -> Self {
        Self {
            update,
            transition: Transition::Interrupt(payload),
        }
    }
}

// ---------------------------------------------------------------------------
// NodeError
// ---------------------------------------------------------------------------

/// Errors raised by node execution. All are Fatal-Abort for the run or
/// branch: the engine applies no partial update for the failing node.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error(transparent)]
    State(#[from] StateError),

    /// Structured model output missing or not parseable into the expected
    /// shape.
    #[error("output parse error: {0}")]
    Parse(String),

    /// The run was cancelled while this node was pending.
    #[error("node cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

// ---------------------------------------------------------------------------
// Node trait + object-safe wrapper
// ---------------------------------------------------------------------------

/// A named unit of work in the graph.
pub trait Node: Send + Sync {
    fn run(
        &self,
        ctx: &NodeContext,
        state: &GraphState,
    ) -> impl Future<Output = Result<NodeOutput, NodeError>> + Send;
}

/// Object-safe version of [`Node`] with a boxed future.
pub trait NodeDyn: Send + Sync {
    fn run_boxed<'a>(
        &'a self,
        ctx: &'a NodeContext,
        state: &'a GraphState,
    ) -> Pin<Box<dyn Future<Output = Result<NodeOutput, NodeError>> + Send + 'a>>;
}

impl<T: Node> NodeDyn for T {
    fn run_boxed<'a>(
        &'a self,
        ctx: &'a NodeContext,
        state: &'a GraphState,
    ) -> Pin<Box<dyn Future<Output = Result<NodeOutput, NodeError>> + Send + 'a>> {
        Box::pin(self.run(ctx, state))
    }
}

/// Type-erased node stored in the graph.
pub struct BoxNode {
    inner: Box<dyn NodeDyn>,
}

impl BoxNode {
    pub fn new<T: Node + 'static>(node: T) -> Self {
        Self {
            inner: Box::new(node),
        }
    }

    pub async fn run(
        &self,
        ctx: &NodeContext,
        state: &GraphState,
    ) -> Result<NodeOutput, NodeError> {
        self.inner.run_boxed(ctx, state).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::state::{single, StateSchema};
    use serde_json::json;
    use std::sync::Arc;

    struct Echo;

    impl Node for Echo {
        async fn run(
            &self,
            _ctx: &NodeContext,
            state: &GraphState,
        ) -> Result<NodeOutput, NodeError> {
            let input = state.get_str("input").unwrap_or_default().to_string();
            Ok(NodeOutput::advance(single("output", json!(input))))
        }
    }

    #[tokio::test]
    async fn test_box_node_dispatch() {
        let schema = Arc::new(
            StateSchema::new()
                .channel("input", crate::graph::state::Reducer::Replace)
                .channel("output", crate::graph::state::Reducer::Replace),
        );
        let mut state = GraphState::new(schema);
        state.apply(single("input", json!("hello"))).unwrap();

        let node = BoxNode::new(Echo);
        let ctx = NodeContext::new("t", CancellationToken::new());
        let output = node.run(&ctx, &state).await.unwrap();
        assert_eq!(output.update.get("output"), Some(&json!("hello")));
    }

    #[test]
    fn test_ensure_active_after_cancel() {
        let token = CancellationToken::new();
        let ctx = NodeContext::new("t", token.clone());
        assert!(ctx.ensure_active().is_ok());
        token.cancel();
        assert!(matches!(ctx.ensure_active(), Err(NodeError::Cancelled)));
    }

    #[test]
    fn test_branch_context_carries_index() {
        let ctx = NodeContext::new("t", CancellationToken::new());
        let branch = ctx.branch(3, CancellationToken::new());
        assert_eq!(branch.branch_index(), Some(3));
        assert_eq!(branch.thread_id(), "t");
    }
}
