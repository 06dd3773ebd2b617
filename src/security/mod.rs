//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request headed for an origin:
//!     → headers.rs (drop identifying and hop-by-hop headers, strip session cookie)
//!     → proxy::request builds the outbound request
//! ```
//!
//! The session gate itself lives in the HTTP handler; this module only keeps
//! what the client sent us from leaking to the origin.

pub mod headers;
