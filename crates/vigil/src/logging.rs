//! Diagnostic logging setup.

use tracing_subscriber::EnvFilter;

/// Install a `tracing` fmt subscriber for the process.
///
/// `RUST_LOG` wins when set; otherwise the level is `debug` when `debug` is
/// true and `info` when not. Does nothing if a global subscriber is
/// already installed.
pub fn init(debug: bool) {
    let level = if debug { "debug" } else { "info" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_target(false)
        .try_init();
}
