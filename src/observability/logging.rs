//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global subscriber once at startup
//! - Derive the default filter from the configured log level
//!
//! # Design Decisions
//! - `RUST_LOG` overrides the configured level entirely
//! - Request spans come from `tower_http`'s trace layer, kept at info

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Filter used when `RUST_LOG` is not set.
pub fn default_filter(level: &str) -> String {
    format!("intercept_proxy={level},tower_http=info")
}

/// Install the global subscriber.
pub fn init(config: &ObservabilityConfig) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(&config.log_level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_scopes_crate_level() {
        assert_eq!(default_filter("debug"), "intercept_proxy=debug,tower_http=info");
    }
}
