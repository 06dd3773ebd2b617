//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, worker-pool permit)
//!     → tls.rs (optional TLS handshake)
//!     → connection.rs (lifecycle tracking)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - A full worker pool queues connections instead of refusing them
//! - Each connection tracked for graceful shutdown
//! - TLS is optional and handled transparently

pub mod connection;
pub mod listener;
pub mod tls;

pub use connection::{ConnectionGuard, ConnectionTracker};
pub use listener::{ConnectionPermit, Listener, ListenerError};
