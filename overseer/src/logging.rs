//! Development-time tracing diagnostics.
//!
//! Separate from the live activity log in [`crate::io::display`]: that file
//! is product output for the side pane, while tracing here is dev-only
//! stderr noise controlled by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`; defaults to `warn`, or `overseer=debug` with
/// `--verbose`. Output goes to stderr so the PTY relay keeps stdout.
pub fn init(verbose: bool) {
    let fallback = if verbose { "overseer=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
