//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatched request (virtual host already selected, method, path)
//!     → router.rs (ordered route table lookup)
//!     → matcher.rs (method + path pattern, parameter capture)
//!     → Return: matched Route + PathParams, or NoMatch
//!
//! Route Compilation (at startup):
//!     RouteConfig[] of one host
//!     → Parse method and path pattern
//!     → Bind handler
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (segment matching only)
//! - Deterministic: same input always matches same route
//! - First match wins (registration order)

pub mod matcher;
pub mod router;

pub use matcher::{PathParams, PathPattern};
pub use router::{Route, RouteHandler, RouteTable};
