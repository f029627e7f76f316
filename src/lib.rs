//! Intercepting TLS proxy.
//!
//! Terminates TLS for several virtual hosts on one socket, selecting each
//! certificate by SNI, relays requests to the real services and keeps the
//! credentials and device records that pass through.

pub mod config;
pub mod http;
pub mod intercept;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod relay;
pub mod routing;
pub mod storage;

pub use config::schema::ProxyConfig;
pub use http::ProxyServer;
pub use lifecycle::Shutdown;
