//! Edges: static successors, conditional routing, and fan-out dispatch.
//!
//! Every node has at most one outgoing edge. A static edge names the
//! successor; a conditional edge inspects the state and yields an
//! [`EdgeTarget`] -- a single node, the terminal, or a fan-out dispatch.
//!
//! A dispatch names the branch node, the join node, and one token per
//! branch. All branches run the same branch node concurrently against
//! isolated state; the engine merges their updates at the barrier in token
//! order and continues at the join node. Cycles are only expressible through
//! conditional edges and are bounded by the engine's step guard.

use super::state::{GraphState, StateUpdate};

/// Reserved id for the graph entry.
pub const START: &str = "__start__";

/// Reserved id for the graph terminal.
pub const END: &str = "__end__";

/// One fan-out branch: the branch's position in the originating collection
/// plus the state slice seeded into its private clone.
#[derive(Debug, Clone)]
pub struct DispatchToken {
    /// Stable index; the barrier merges branch updates in this order.
    pub branch_index: usize,
    /// Initial state slice applied to the branch's private state.
    pub seed: StateUpdate,
}

impl DispatchToken {
    pub fn new(branch_index: usize, seed: StateUpdate) -> Self {
        Self { branch_index, seed }
    }
}

/// Where a conditional edge routes execution.
pub enum EdgeTarget {
    /// Continue at a single node.
    Node(String),
    /// Terminate the run.
    End,
    /// Fan out one concurrent branch per token, barrier-join, then continue
    /// at `join`.
    Dispatch {
        /// Node every branch executes.
        node: String,
        /// Node to continue at after the barrier.
        join: String,
        branches: Vec<DispatchToken>,
    },
}

/// Routing function of a conditional edge.
pub type ConditionFn = dyn Fn(&GraphState) -> EdgeTarget + Send + Sync;

/// A node's outgoing edge.
pub enum Edge {
    /// Unconditional successor (`END` terminates).
    Static(String),
    /// State-dependent routing.
    Conditional(Box<ConditionFn>),
}

impl std::fmt::Debug for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Edge::Static(target) => f.debug_tuple("Static").field(target).finish(),
            Edge::Conditional(_) => f.write_str("Conditional(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::state::StateSchema;
    use std::sync::Arc;

    #[test]
    fn test_conditional_edge_routes_on_state() {
        let edge = Edge::Conditional(Box::new(|state: &GraphState| {
            if state.get_str("resume") == Some("approve") {
                EdgeTarget::Node("execute".to_string())
            } else {
                EdgeTarget::Node("replan".to_string())
            }
        }));

        let schema = Arc::new(StateSchema::new());
        let mut state = GraphState::new(Arc::clone(&schema));
        state
            .apply(crate::graph::state::single(
                "resume",
                serde_json::json!("approve"),
            ))
            .unwrap();

        let Edge::Conditional(route) = &edge else {
            panic!("expected conditional edge");
        };
        match route(&state) {
            EdgeTarget::Node(id) => assert_eq!(id, "execute"),
            _ => panic!("expected node target"),
        }
    }
}
