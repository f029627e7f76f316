//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger shutdown
//!
//! Shutdown (shutdown.rs):
//!     Trigger → front-ends stop accepting, drain → echo listeners stop → Exit
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
