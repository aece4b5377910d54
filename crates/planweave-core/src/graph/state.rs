//! Reducer-governed workflow state.
//!
//! State is a JSON object of named channels. Nodes never mutate state in
//! place: each node returns a partial update, and every channel merges
//! updates through its registered reducer -- `Replace` (last write wins) or
//! `Append` (array extend). Fan-out branches each get a private clone; branch
//! updates are merged back through the same reducers at the barrier, in
//! branch-index order.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;

/// Channel the engine writes the resume token into on `resume`.
pub const RESUME_CHANNEL: &str = "resume";

/// Channel that collects failed-branch records under the best-effort join
/// policy.
pub const BRANCH_ERRORS_CHANNEL: &str = "branch_errors";

/// A partial state update produced by a node.
pub type StateUpdate = Map<String, Value>;

/// Build a single-channel update.
pub fn single(channel: &str, value: Value) -> StateUpdate {
    let mut update = StateUpdate::new();
    update.insert(channel.to_string(), value);
    update
}

/// How a channel merges incoming partial updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    /// Last write wins.
    Replace,
    /// The channel holds an array; array updates extend it, scalar updates
    /// are pushed.
    Append,
}

/// The set of channels a graph's state may carry, with their reducers.
#[derive(Debug, Default)]
pub struct StateSchema {
    channels: HashMap<String, Reducer>,
}

impl StateSchema {
    /// A schema carrying only the engine-reserved channels.
    pub fn new() -> Self {
        let mut schema = Self {
            channels: HashMap::new(),
        };
        schema.channels.insert(RESUME_CHANNEL.to_string(), Reducer::Replace);
        schema
            .channels
            .insert(BRANCH_ERRORS_CHANNEL.to_string(), Reducer::Append);
        schema
    }

    /// Register a channel. Re-registering overrides the reducer.
    pub fn channel(mut self, name: &str, reducer: Reducer) -> Self {
        self.channels.insert(name.to_string(), reducer);
        self
    }

    fn reducer(&self, name: &str) -> Option<Reducer> {
        self.channels.get(name).copied()
    }
}

/// Errors from applying a state update.
#[derive(Debug, Error)]
pub enum StateError {
    /// An update addressed a channel the schema does not declare.
    #[error("unknown state channel: '{0}'")]
    UnknownChannel(String),

    /// An append-reduced channel holds a non-array value.
    #[error("channel '{0}' is append-reduced but does not hold an array")]
    NotAppendable(String),

    /// A persisted state snapshot was not a JSON object.
    #[error("state snapshot is not a JSON object")]
    NotAnObject,
}

/// Workflow state: a JSON object of channels, merged through reducers.
#[derive(Debug, Clone)]
pub struct GraphState {
    schema: Arc<StateSchema>,
    channels: Map<String, Value>,
}

impl GraphState {
    pub fn new(schema: Arc<StateSchema>) -> Self {
        Self {
            schema,
            channels: Map::new(),
        }
    }

    /// Rehydrate state from a checkpoint snapshot.
    pub fn from_value(schema: Arc<StateSchema>, snapshot: Value) -> Result<Self, StateError> {
        match snapshot {
            Value::Object(channels) => Ok(Self { schema, channels }),
            _ => Err(StateError::NotAnObject),
        }
    }

    /// Snapshot the state for persistence.
    pub fn to_value(&self) -> Value {
        Value::Object(self.channels.clone())
    }

    pub fn get(&self, channel: &str) -> Option<&Value> {
        self.channels.get(channel)
    }

    pub fn get_str(&self, channel: &str) -> Option<&str> {
        self.get(channel).and_then(Value::as_str)
    }

    pub fn get_u64(&self, channel: &str) -> Option<u64> {
        self.get(channel).and_then(Value::as_u64)
    }

    /// Merge a partial update through the channel reducers.
    pub fn apply(&mut self, update: StateUpdate) -> Result<(), StateError> {
        for (channel, value) in update {
            match self
                .schema
                .reducer(&channel)
                .ok_or_else(|| StateError::UnknownChannel(channel.clone()))?
            {
                Reducer::Replace => {
                    self.channels.insert(channel, value);
                }
                Reducer::Append => {
                    let slot = self
                        .channels
                        .entry(channel.clone())
                        .or_insert_with(|| Value::Array(Vec::new()));
                    let Value::Array(items) = slot else {
                        return Err(StateError::NotAppendable(channel));
                    };
                    match value {
                        Value::Array(incoming) => items.extend(incoming),
                        other => items.push(other),
                    }
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
