//! Proxy pipeline subsystem.
//!
//! # Data Flow
//! ```text
//! Authenticated proxy request (target URL resolved by routing)
//!     → request.rs (strip blocklist, Referer/Origin, identity encoding, UA)
//!     → GET? cache lookup → hit: treat as a fresh 200
//!     → pipeline.rs fetch (pooled client, retry TLS/EOF + timeouts)
//!     → response.rs (forwarded headers, Location, Set-Cookie, CORS)
//!     → HTML ≤ threshold: transcode + rewrite links + inject, exact length
//!       otherwise: 8 KiB chunked stream, teed into the cache
//! ```
//!
//! # Design Decisions
//! - The raw upstream body is cached; rewriting runs again on every serve
//! - Upstream statuses are forwarded as-is; only a non-HTML 404 is replaced
//!   by the local not-found page
//! - A client disconnect does not cancel an upstream call already issued

pub mod pipeline;
pub mod request;
pub mod response;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::resilience::FetchError;

pub use pipeline::ProxyPipeline;

/// Failures that end a proxied request early.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("WebSocket proxying is not implemented")]
    WebSocket,

    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("failed to read request body: {0}")]
    Body(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Fetch(_) | ProxyError::Body(_) => StatusCode::BAD_REQUEST,
            ProxyError::WebSocket => StatusCode::NOT_IMPLEMENTED,
            ProxyError::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}
