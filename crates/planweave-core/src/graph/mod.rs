//! Graph model and executor.
//!
//! - `state` -- reducer-governed channel state shared along a run
//! - `node` -- the `Node` trait, its object-safe boxed form, and node errors
//! - `edge` -- static and conditional edges, fan-out dispatch tokens
//! - `builder` -- graph construction with build-time validation
//! - `engine` -- the executor: run/resume, barrier joins, checkpointing

pub mod builder;
pub mod edge;
pub mod engine;
pub mod node;
pub mod state;

pub use builder::{GraphBuildError, GraphBuilder, WorkflowGraph};
pub use edge::{DispatchToken, Edge, EdgeTarget, END, START};
pub use engine::{EngineConfig, GraphError, JoinPolicy, RunOutcome, WorkflowEngine};
pub use node::{BoxNode, Node, NodeContext, NodeError, NodeOutput, Transition};
pub use state::{GraphState, Reducer, StateSchema, StateUpdate};
