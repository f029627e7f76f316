//! Upstream relay.
//!
//! Forwards intercepted requests to the real origin and reports the result
//! back to the client unchanged, optionally running a side effect once the
//! client has its answer.

pub mod client;
pub mod error;
pub mod passthrough;

use axum::http::Method;

pub use client::build_client;
pub use error::UpstreamError;
pub use passthrough::{
    forwarded_headers, on_success, CallbackError, Relay, SuccessCallback, UpstreamReply,
};

/// Methods the relay forwards.
pub fn is_relay_method(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::POST | Method::DELETE)
}
