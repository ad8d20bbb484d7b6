//! Tracing and logging setup shared by every bakeops process.

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use self::tracing::{LogFormat, ObservabilityConfig, ObservabilityError, init_with_fallback};

/// Initialize process-wide tracing from the environment.
///
/// An invalid `BAKEOPS_LOG` falls back to the default filter and is reported on
/// stderr, since no subscriber exists yet to carry the message. Safe to call
/// multiple times; subsequent calls are no-ops.
pub fn init() {
    if let Err(err) = init_with_fallback(&ObservabilityConfig::from_env()) {
        eprintln!("bakeops: {err}; logging with the default filter");
    }
}
