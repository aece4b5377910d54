//! LLM gateway port.
//!
//! - `gateway` -- the `LlmGateway` trait and its object-safe boxed form
//! - `scripted` -- deterministic in-tree gateway for tests and offline runs

pub mod gateway;
pub mod scripted;

pub use gateway::{BoxLlmGateway, LlmGateway};
pub use scripted::ScriptedGateway;
