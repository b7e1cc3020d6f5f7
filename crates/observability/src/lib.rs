//! Shared tracing setup for GenesisDB client processes.

/// Initialize process-wide logging from the environment.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init();
}

/// Tracing configuration (format, filters).
pub mod tracing;

pub use tracing::{LogFormat, init_with};
