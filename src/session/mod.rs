//! Session subsystem.
//!
//! # Data Flow
//! ```text
//! POST <login_path> (user, password)
//!     → credentials.rs (verify)
//!     → store.rs (create_session → token)
//!     → Set-Cookie: <name>=<token>
//!
//! Every other request:
//!     Cookie → store.rs (is_valid)
//!
//! Periodic:
//!     lifecycle maintenance → store.rs (recycle)
//! ```

pub mod credentials;
pub mod store;

pub use credentials::Credentials;
pub use store::{RecycleStats, Session, SessionError, SessionStore};
