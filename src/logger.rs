//! Logging setup shared by the apex-vio binaries and benchmarks
//!
//! Factors log through `tracing` macros only; installing a subscriber is left to
//! the executable. This module provides the standard one.

use tracing::Level;

/// Install the apex-vio tracing subscriber with INFO as the default level.
///
/// The level can be overridden through `RUST_LOG`:
/// ```bash
/// RUST_LOG=apex_vio=trace cargo run --bin check_projection_jacobians
/// ```
pub fn init_logger() {
    init_logger_with_level(Level::INFO)
}

/// Install the apex-vio tracing subscriber with a custom default level.
///
/// Calling this more than once is harmless: only the first subscriber is kept.
///
/// # Example
/// ```no_run
/// use apex_vio::init_logger_with_level;
/// use tracing::Level;
///
/// init_logger_with_level(Level::DEBUG);
/// tracing::debug!("projection factor diagnostics enabled");
/// ```
pub fn init_logger_with_level(default_level: Level) {
    use tracing_subscriber::fmt::time::SystemTime;

    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .with_timer(SystemTime)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(false)
        .try_init()
        .is_ok();

    if !installed {
        tracing::debug!("tracing subscriber already installed, keeping existing one");
    }
}
