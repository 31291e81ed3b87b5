//! Logging setup on top of `tracing-subscriber`
//!
//! `RUST_LOG` wins over the configured filter, e.g. `RUST_LOG=validate_tabular=trace`.
//! Logs go to stderr so JSON output on stdout stays machine-readable.

use tracing_subscriber::{EnvFilter, fmt};

/// Install the global subscriber. `default_filter` applies when `RUST_LOG` is unset or invalid.
///
/// ```no_run
/// validate_tabular::logging::init("info");
/// ```
pub fn init(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_line_number(true)
        .init();
}

/// Debug-level logging captured by the test harness. Safe to call from every test.
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
