//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to origin:
//!     → per-attempt timeout (around each send in the pipeline)
//!     → On failure: retries.rs (classify, retry transient failures with fixed backoff)
//!     → Exhausted or fatal: error surfaced to the pipeline
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every upstream call has a deadline
//! - Only TLS/EOF and timeout failures are retried
//! - Upstream 4xx/5xx are responses, not failures, and are never retried

pub mod retries;

pub use retries::{retry_transient, FetchError, RetryPolicy};
