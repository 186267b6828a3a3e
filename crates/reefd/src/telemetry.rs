//! Telemetry initialization for the Reef daemon.
//!
//! Console tracing only: structured logs to stdout, filtered by `RUST_LOG`
//! when set, falling back to the configured level. Exporters (OTLP and
//! friends) belong to the deployment glue, not this binary.

use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber.
///
/// Call this once at startup, before any `tracing` events are emitted.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
