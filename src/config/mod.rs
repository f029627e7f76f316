//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → consumed once at startup to build registries and route tables
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no hot reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::ProxyConfig;
pub use schema::ListenerConfig;
pub use schema::HostConfig;
pub use schema::RouteConfig;
pub use schema::RouteKind;
pub use schema::TlsConfig;
pub use schema::UpstreamConfig;
pub use schema::InterceptionConfig;
pub use schema::ObservabilityConfig;
pub use schema::SecurityConfig;
pub use schema::StorageConfig;
pub use loader::{load_config, parse_config, ConfigError};
