//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Initialize services → Start listeners
//!
//! Maintenance (maintenance.rs):
//!     interval tick → session recycle + save
//!     interval tick → cache sweep
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain connections → Save sessions → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then services, then listeners
//! - Ordered shutdown: stop accept, drain, persist
//! - Shutdown has timeout: forced exit after deadline

pub mod maintenance;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{Services, StartupError};
