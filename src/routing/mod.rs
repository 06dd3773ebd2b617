//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (path, query, Referer)
//!     → router.rs (login / favicon first)
//!     → matcher.rs (direct target, ?url=, bare domain)
//!     → router.rs (local pages and assets)
//!     → matcher.rs (Referer completion)
//!     → Return: Route, or NotFound
//! ```
//!
//! # Design Decisions
//! - Session checks live in the HTTP layer; routing only says which
//!   routes are public
//! - Deterministic: same input always yields the same route

pub mod matcher;
pub mod router;

pub use router::{AssetDir, RequestRouter, Route};
