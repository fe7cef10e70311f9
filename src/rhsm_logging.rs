//! `tracing` subscriber setup.
//!
//! Logs go to stderr; a plugin host owns stdout. The filter comes from
//! `RHSM_LOG`, then `RUST_LOG`, then defaults to `info`.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::rhsm_error::RhsmError;

/// Env var holding the log filter directive.
pub const LOG_ENV: &str = "RHSM_LOG";

const DEFAULT_FILTER: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns [`RhsmError::Logging`] if a global subscriber is already set.
pub fn init_logging() -> Result<(), RhsmError> {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| RhsmError::Logging(e.to_string()))
}

/// Install the global subscriber unless one is already set.
pub fn try_init_logging() {
    let _ = init_logging();
}
