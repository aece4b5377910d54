//! Checkpoint records for suspend/resume.
//!
//! A checkpoint is a persisted snapshot of a run: thread id, latest state,
//! and -- when the run is suspended at an interrupt -- the pending interrupt
//! payload. Resume consults the checkpoint and continues from the suspended
//! node's successor edge; earlier nodes are never replayed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The interrupt a suspended run is waiting on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingInterrupt {
    /// Node that raised the interrupt. Resume continues from this node's
    /// outgoing edge.
    pub node_id: String,
    /// Payload surfaced to the caller (e.g. the plan awaiting approval).
    pub payload: serde_json::Value,
}

/// Persisted snapshot of a run, keyed by thread id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub thread_id: String,
    /// Latest workflow state as a JSON object of channels.
    pub state: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_interrupt: Option<PendingInterrupt>,
    pub updated_at: DateTime<Utc>,
}

/// Errors from checkpoint store operations.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint store error: {0}")]
    Store(String),

    #[error("checkpoint serialization error: {0}")]
    Serialization(String),
}
