//! Logging setup based on `tracing-subscriber`.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "info,tether_native=debug";

/// Install a fmt subscriber honoring `RUST_LOG`, falling back to [`DEFAULT_FILTER`].
///
/// Calling this more than once is harmless; later calls are ignored and
/// return `false`.
pub fn init() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok();
    announce(installed, "RUST_LOG or default")
}

/// Install a fmt subscriber with an explicit filter directive string.
///
/// # Example
/// ```no_run
/// tether_core::logging::init_with_filter("warn,tether_native::control=trace");
/// ```
pub fn init_with_filter(filter: &str) -> bool {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .try_init()
        .is_ok();
    announce(installed, filter)
}

/// Install a subscriber that writes through the test harness capture.
pub fn init_for_tests() -> bool {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("trace"))
        .with_test_writer()
        .try_init()
        .is_ok();
    announce(installed, "trace")
}

fn announce(installed: bool, filter: &str) -> bool {
    if installed {
        tracing::debug!("Logging initialized ({})", filter);
    }
    installed
}
