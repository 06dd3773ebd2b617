//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout / rolling log file
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request ID (x-request-id) is attached to the per-request span
//! - Metrics are cheap (atomic increments) and no-ops when disabled

pub mod logging;
pub mod metrics;
