//! Graph construction with build-time validation.
//!
//! The builder checks what it can before any node runs: the entry must be a
//! registered node, static edges must reference registered nodes (or `END`),
//! and the static-edge subgraph must be acyclic -- cycles are only
//! expressible through conditional edges, which the engine's step guard
//! bounds at runtime.

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;

use super::edge::{ConditionFn, Edge, END};
use super::node::{BoxNode, Node};

/// A validated, immutable graph: nodes, their outgoing edges, and the entry.
pub struct WorkflowGraph {
    nodes: HashMap<String, BoxNode>,
    edges: HashMap<String, Edge>,
    entry: String,
}

impl std::fmt::Debug for WorkflowGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowGraph")
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .field("edges", &self.edges.keys().collect::<Vec<_>>())
            .field("entry", &self.entry)
            .finish()
    }
}

impl WorkflowGraph {
    pub fn node(&self, id: &str) -> Option<&BoxNode> {
        self.nodes.get(id)
    }

    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edges.get(id)
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }
}

/// Builder for [`WorkflowGraph`].
#[derive(Default)]
pub struct GraphBuilder {
    nodes: HashMap<String, BoxNode>,
    edges: HashMap<String, Edge>,
    entry: Option<String>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node under `id`.
    pub fn node<T: Node + 'static>(mut self, id: &str, node: T) -> Self {
        self.nodes.insert(id.to_string(), BoxNode::new(node));
        self
    }

    /// Static edge `from -> to` (`to` may be [`END`]).
    pub fn edge(mut self, from: &str, to: &str) -> Self {
        self.edges.insert(from.to_string(), Edge::Static(to.to_string()));
        self
    }

    /// Conditional edge out of `from`.
    pub fn conditional_edge<F>(mut self, from: &str, route: F) -> Self
    where
        F: Fn(&super::state::GraphState) -> super::edge::EdgeTarget + Send + Sync + 'static,
    {
        self.edges
            .insert(from.to_string(), Edge::Conditional(Box::new(route) as Box<ConditionFn>));
        self
    }

    /// Designate the entry node.
    pub fn entry(mut self, id: &str) -> Self {
        self.entry = Some(id.to_string());
        self
    }

    /// Validate and freeze the graph.
    pub fn build(self) -> Result<WorkflowGraph, GraphBuildError> {
        let entry = self.entry.ok_or(GraphBuildError::MissingEntry)?;
        if !self.nodes.contains_key(&entry) {
            return Err(GraphBuildError::UnknownNode {
                context: "entry".to_string(),
                node: entry,
            });
        }

        for (from, edge) in &self.edges {
            if !self.nodes.contains_key(from) {
                return Err(GraphBuildError::UnknownNode {
                    context: "edge source".to_string(),
                    node: from.clone(),
                });
            }
            if let Edge::Static(to) = edge {
                if to.as_str() != END && !self.nodes.contains_key(to) {
                    return Err(GraphBuildError::UnknownNode {
                        context: format!("edge from '{from}'"),
                        node: to.clone(),
                    });
                }
            }
        }

        Self::check_static_cycles(&self.nodes, &self.edges)?;

        Ok(WorkflowGraph {
            nodes: self.nodes,
            edges: self.edges,
            entry,
        })
    }

    /// Topological sort over the static edges only.
    fn check_static_cycles(
        nodes: &HashMap<String, BoxNode>,
        edges: &HashMap<String, Edge>,
    ) -> Result<(), GraphBuildError> {
        let mut graph = DiGraph::<&str, ()>::new();
        let indices: HashMap<&str, _> = nodes
            .keys()
            .map(|id| (id.as_str(), graph.add_node(id.as_str())))
            .collect();

        for (from, edge) in edges {
            if let Edge::Static(to) = edge {
                if to.as_str() == END {
                    continue;
                }
                graph.add_edge(indices[from.as_str()], indices[to.as_str()], ());
            }
        }

        toposort(&graph, None).map_err(|cycle| {
            let node = graph[cycle.node_id()];
            GraphBuildError::StaticCycle(node.to_string())
        })?;

        Ok(())
    }
}

/// Errors detected while constructing a graph.
#[derive(Debug, thiserror::Error)]
pub enum GraphBuildError {
    #[error("no entry node designated")]
    MissingEntry,

    #[error("{context} references unknown node '{node}'")]
    UnknownNode { context: String, node: String },

    #[error("static-edge cycle involving node '{0}'")]
    StaticCycle(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::{NodeContext, NodeError, NodeOutput};
    use crate::graph::state::GraphState;

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

    #[test]
    fn test_build_linear_graph() {
        let graph = GraphBuilder::new()
            .node("a", Noop)
            .node("b", Noop)
            .edge("a", "b")
            .edge("b", END)
            .entry("a")
            .build()
            .unwrap();
        assert_eq!(graph.entry(), "a");
        assert!(graph.node("b").is_some());
    }

    #[test]
    fn test_missing_entry_rejected() {
        let err = GraphBuilder::new().node("a", Noop).build().unwrap_err();
        assert!(matches!(err, GraphBuildError::MissingEntry));
    }

    #[test]
    fn test_unknown_edge_target_rejected() {
        let err = GraphBuilder::new()
            .node("a", Noop)
            .edge("a", "ghost")
            .entry("a")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_static_cycle_rejected() {
        let err = GraphBuilder::new()
            .node("a", Noop)
            .node("b", Noop)
            .edge("a", "b")
            .edge("b", "a")
            .entry("a")
            .build()
            .unwrap_err();
        assert!(matches!(err, GraphBuildError::StaticCycle(_)));
    }

    #[test]
    fn test_conditional_back_edge_allowed() {
        // Retry loops are conditional back-edges; only static cycles are
        // build errors.
        let graph = GraphBuilder::new()
            .node("plan", Noop)
            .node("review", Noop)
            .edge("plan", "review")
            .conditional_edge("review", |_state| {
                super::super::edge::EdgeTarget::Node("plan".to_string())
            })
            .entry("plan")
            .build();
        assert!(graph.is_ok());
    }
}
