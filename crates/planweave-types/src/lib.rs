//! Shared domain types for Planweave.
//!
//! This crate contains the core domain types used across the Planweave
//! orchestration engine: conversation messages, LLM gateway shapes, plans and
//! subtask records, tool contracts, sandbox execution records, checkpoints,
//! and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror,
//! schemars.

pub mod checkpoint;
pub mod llm;
pub mod message;
pub mod sandbox;
pub mod task;
pub mod tool;
