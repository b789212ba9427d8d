//! Tracing subscriber setup shared by binaries and integration tests.

use tracing_subscriber::EnvFilter;

/// Initialize tracing with an `info` default filter.
pub fn init() {
    init_with_filter("info");
}

/// Initialize tracing, preferring `RUST_LOG` over the given default filter.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_with_filter(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
