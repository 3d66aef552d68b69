//! Tracing subscriber setup for binaries and tests that embed the engine.

use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber filtered by `level` (an `EnvFilter`
/// directive such as `info` or `wcmerge_core=debug`). Invalid directives fall
/// back to `info`. Returns `false` when a subscriber was already installed.
pub fn init_tracing(level: &str) -> bool {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .try_init()
        .is_ok()
}
