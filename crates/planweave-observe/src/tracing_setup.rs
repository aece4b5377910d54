//! Tracing subscriber initialization.
//!
//! Installs a structured `fmt` layer filtered by `RUST_LOG`, and optionally
//! bridges spans to OpenTelemetry with a stdout exporter for local
//! inspection (swap the exporter for OTLP when shipping traces anywhere
//! real).
//!
//! ```no_run
//! planweave_observe::tracing_setup::init_tracing(false).unwrap();
//! ```

use std::sync::OnceLock;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Provider kept for a clean flush at process exit.
static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

/// Install the global subscriber. Errors if one is already set.
pub fn init_tracing(enable_otel: bool) -> Result<(), Box<dyn std::error::Error>> {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE);
    let env_filter = EnvFilter::from_default_env();
    let registry = tracing_subscriber::registry().with(env_filter).with(fmt_layer);

    if !enable_otel {
        registry.init();
        return Ok(());
    }

    let provider = SdkTracerProvider::builder()
        .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
        .build();
    let tracer = provider.tracer("planweave");
    let _ = TRACER_PROVIDER.set(provider.clone());
    opentelemetry::global::set_tracer_provider(provider);

    registry.with(tracing_opentelemetry::layer().with_tracer(tracer)).init();
    Ok(())
}

/// Flush buffered spans before exit. No-op when OTel was not enabled.
pub fn shutdown_tracing() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        if let Err(e) = provider.shutdown() {
            eprintln!("warning: tracer provider shutdown error: {e}");
        }
    }
}
