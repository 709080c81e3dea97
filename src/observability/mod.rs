//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters and histograms via the `metrics` facade)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Whatever metrics recorder the embedding application installs
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows through every log line of a request
//! - Metrics are cheap (atomic increments, no-ops without a recorder)

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
