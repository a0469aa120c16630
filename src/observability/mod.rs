//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! request.finish (notifications bus)
//!     → logging.rs (Logger: one structured line per request, params filtered)
//!     → metrics.rs (counters, histograms)
//!
//! HTTP layer:
//!     → tracing.rs (span per request, carrying the request id)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Both request subscribers hang off the application's canonical bus
//! - Request ID flows through the span into every nested log event
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
pub mod tracing;

pub use logging::{init_logging, Logger};
