//! Upstream HTTP client construction.

use std::time::Duration;

use crate::config::UpstreamConfig;
use crate::relay::error::UpstreamError;

/// Build the shared upstream client.
///
/// Certificate validation follows `accept_invalid_certs`; every exchange is
/// bounded by `timeout_secs`.
pub fn build_client(config: &UpstreamConfig) -> Result<reqwest::Client, UpstreamError> {
    if config.accept_invalid_certs {
        tracing::warn!("Upstream certificate validation is disabled");
    }

    reqwest::Client::builder()
        .danger_accept_invalid_certs(config.accept_invalid_certs)
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .build()
        .map_err(UpstreamError::Client)
}
