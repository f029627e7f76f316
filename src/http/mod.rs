//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TLS connection (server name attached)    Plaintext connection
//!     → server.rs (axum app, request id, trace)
//!     → dispatch.rs (virtual host by SNI or Host header, /certs, route table)
//!     → request.rs (buffered InboundRequest handed to the route handler)
//!     → response.rs (relay outcome or fixed answers)
//!     → Send to client
//! ```

pub mod dispatch;
pub mod request;
pub mod response;
pub mod server;

pub use dispatch::{Dispatcher, VirtualHost};
pub use request::{InboundRequest, RequestHost, TlsServerName, X_REQUEST_ID};
pub use server::{ProxyServer, ServerError};
