//! Upstream error taxonomy.

use axum::body::Bytes;
use axum::http::{HeaderValue, Method, StatusCode};
use thiserror::Error;

/// Why a relayed request did not produce a successful upstream reply.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The relay only forwards GET, POST and DELETE.
    #[error("method {0} is not relayed")]
    UnsupportedMethod(Method),

    /// No reply within the configured upstream timeout.
    #[error("upstream request timed out")]
    Timeout,

    /// Connection, TLS or protocol failure talking to the upstream.
    #[error("upstream request failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// The upstream answered with a non-success status.
    #[error("upstream responded with {status}")]
    Status {
        status: StatusCode,
        content_type: Option<HeaderValue>,
        body: Bytes,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build upstream client: {0}")]
    Client(#[source] reqwest::Error),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout
        } else {
            UpstreamError::Transport(err)
        }
    }
}

impl UpstreamError {
    /// Metric label for this failure.
    pub fn outcome(&self) -> &'static str {
        match self {
            UpstreamError::UnsupportedMethod(_) => "unsupported_method",
            UpstreamError::Timeout => "timeout",
            UpstreamError::Transport(_) => "transport",
            UpstreamError::Status { .. } => "status",
            UpstreamError::Client(_) => "client",
        }
    }
}
