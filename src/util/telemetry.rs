//! Telemetry helpers for structured logging and tracing.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "opportunity_guard=info";

/// Initialize tracing. Callers can install their own subscriber; this
/// helper installs an env-based fmt subscriber only if none is set.
///
/// `RUST_LOG` takes precedence over the crate default of `info`.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
