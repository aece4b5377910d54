//! Tool port and registry.

pub mod registry;

pub use registry::{BoxTool, Tool, ToolRegistry};
