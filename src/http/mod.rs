//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (hyper-util connection, middleware stack)
//!     → request.rs (request ID, trace span)
//!     → handlers.rs (classify, session gate, dispatch)
//!         → local page / asset (response.rs helpers)
//!         → proxy pipeline
//!     → Send to client
//! ```

pub mod handlers;
pub mod request;
pub mod response;
pub mod server;

pub use request::{request_id, UuidRequestId, X_REQUEST_ID};
pub use server::{build_router, AppState, HttpServer};
