//! Tracing and telemetry setup for Planweave.

pub mod tracing_setup;
