//! Response cache subsystem.
//!
//! # Data Flow
//! ```text
//! GET through the pipeline:
//!     → store.rs lookup (check html/other, media via the in-memory
//!       key → extension index)
//!     → expired? delete body + sidecar, miss
//!     → hit: body + header snapshot, mtime refreshed
//!
//! 200 GET response:
//!     → store.rs gates (global, family, large-file)
//!     → layout.rs path: <family>/<blake3(url)>.<ext>
//!     → staged write + rename
//!
//! Maintenance:
//!     → sweep: expired first, then oldest mtime until under max size
//!     → every removal also drops the key from the media index
//! ```
//!
//! # Design Decisions
//! - Keyed by the raw target URL, never the rewritten one
//! - A vanished file is a miss, so lookups may race sweeps freely
//! - Failures never leave this module; caching is best-effort

pub mod layout;
pub mod store;

pub use layout::{cache_key, CacheLayout, ContentFamily};
pub use store::{CacheError, CacheUsage, CachedResponse, HeaderSnapshot, ResponseCache, SweepStats};
