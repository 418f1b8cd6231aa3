//! Development-time tracing for debugging imagesmith.
//!
//! Diagnostics go to stderr via `RUST_LOG`. Stdout is reserved for the JSON
//! results printed by the CLI, so it stays machine-readable at any log level.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `warn` if unset.
///
/// # Example
/// ```bash
/// RUST_LOG=imagesmith=debug imagesmith build --task "print the hex for blue"
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
