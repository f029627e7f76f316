//! Observability subsystem.
//!
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, request spans with x-request-id)
//!     → metrics.rs (counters and latency histograms, Prometheus scrape)
//! ```

pub mod logging;
pub mod metrics;
