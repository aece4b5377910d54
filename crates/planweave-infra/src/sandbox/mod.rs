//! Sandbox execution service clients.

pub mod http;

pub use http::{HttpSandboxConfig, HttpSandboxService};
