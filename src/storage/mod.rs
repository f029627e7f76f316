//! Local persistence subsystem.
//!
//! # Data Flow
//! ```text
//! Interception handler
//!     → artifacts.rs (remote blob → certs dir, derived record → data dir)
//!     → sessions.rs (authentication payload → data/user_<token>.json)
//!     → atomic.rs (per-key lock, temp file, rename)
//! ```
//!
//! # Design Decisions
//! - File names are deterministic so unrelated readers can find them
//! - Same-key writers are serialized; readers never see partial files
//! - No expiry and no deletion

pub mod artifacts;
pub mod atomic;
pub mod sessions;

pub use artifacts::{ArtifactCache, ArtifactError};
pub use sessions::{SessionError, SessionProfile, SessionStore};
