//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection (TLS port)
//!     → tls.rs (ClientHello, SNI lookup, handshake)
//!     → connection.rs (state machine, per-connection id)
//!     → Hand off to HTTP layer with the negotiated server name
//!
//! Incoming TCP connection (echo ports)
//!     → echo.rs (bytes copied back until EOF)
//! ```

pub mod connection;
pub mod echo;
pub mod tls;

pub use connection::{ConnectionId, ConnectionLifecycle, ConnectionState};
pub use tls::{SecureContextRegistry, SniAcceptor, TlsError};
