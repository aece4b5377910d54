//! Infrastructure adapters for Planweave.
//!
//! Implements the ports defined in `planweave-core` against real services:
//! an OpenAI-compatible completion gateway, an HTTP sandbox execution
//! service client, a durable SQLite checkpoint store, and an HTTP search
//! tool.

pub mod checkpoint;
pub mod llm;
pub mod sandbox;
pub mod tools;
