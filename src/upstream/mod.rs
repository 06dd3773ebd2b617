//! Upstream client subsystem.
//!
//! # Data Flow
//! ```text
//! Pipeline needs to fetch
//!     → pool.rs (acquire: idle → new (≤ capacity) → wait → uncounted)
//!     → client.rs (reqwest client: no cert checks, no redirects, timeout)
//!     → PooledClient dropped → release (requeue, or discard if unusable)
//! ```
//!
//! # Design Decisions
//! - Health is only judged on release; borrowers mark clients unusable
//! - Created count is reserved with compare-and-swap so it never passes capacity
//! - Release is tied to `Drop`, so early returns and errors still give back

pub mod client;
pub mod pool;

pub use client::{build_client, ClientSettings};
pub use pool::{ClientPool, PoolStats, PooledClient};
