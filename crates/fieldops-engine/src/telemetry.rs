//! # Tracing Setup
//!
//! ## Log Levels
//! - `RUST_LOG=debug` - Show debug messages
//! - `RUST_LOG=fieldops_engine=trace` - Trace the engine only
//! - Default: INFO, with DEBUG for the fieldops crates

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str =
    "info,fieldops_core=debug,fieldops_db=debug,fieldops_engine=debug,sqlx=warn";

/// Installs the global fmt subscriber.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
