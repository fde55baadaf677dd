//! # Tracing Setup
//!
//! `RUST_LOG` wins when set; otherwise the configured filter directive
//! applies.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingSettings;

/// Installs the global fmt subscriber.
///
/// Returns `false` when a subscriber was already installed (tests, embedding
/// applications); the existing one is left in place.
pub fn init(settings: &LoggingSettings) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
