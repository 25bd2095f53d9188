//! Structured logging initialization (component I).
//!
//! Grounded on `pycckuu-wintermute`'s `tracing` + `tracing-subscriber` stack, adopted
//! here because the host crate has no structured-logging dependency of its own. All
//! output goes to stderr so stdout stays reserved for the crawl's final JSON result,
//! mirroring the host's convention of "JSON on stdout, diagnostics on stderr".

use tracing_subscriber::EnvFilter;

/// Initializes the global `tracing` subscriber from a `debug|info|warn|error` level
/// string. Idempotent within a process: a second call is a silent no-op, matching
/// `tracing_subscriber`'s own global-default-already-set behavior.
pub fn init(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
