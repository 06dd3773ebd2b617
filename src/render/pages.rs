//! Local pages: index, login, chat, not-found and the favicon.
//!
//! Pages are read once at startup. A missing file is logged and replaced by
//! a minimal built-in page so the proxy stays usable.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use thiserror::Error;

use crate::config::ServerConfig;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to read page {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

const FALLBACK_INDEX: &str = "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Index</title></head>\
<body><form action=\"/\" method=\"get\"><input name=\"url\" placeholder=\"https://\"><button>Go</button></form></body></html>";

const FALLBACK_LOGIN: &str = "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{server_name}</title></head>\
<body data-failed=\"{login_failed}\" data-ts=\"{timestamp}\"><form method=\"post\">\
<input name=\"user\"><input name=\"password\" type=\"password\"><button>Login</button></form></body></html>";

const FALLBACK_NOT_FOUND: &str = "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>404</title></head>\
<body><h1>404 Not Found</h1></body></html>";

#[derive(Debug, Clone)]
pub struct Pages {
    index: String,
    login: String,
    chat: String,
    not_found: String,
    favicon: Bytes,
    server_name: String,
    domain: String,
}

impl Pages {
    pub fn load(server: &ServerConfig) -> Self {
        let favicon = match std::fs::read(&server.favicon_file) {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) => {
                tracing::warn!(path = %server.favicon_file.display(), error = %e, "Favicon not found");
                Bytes::new()
            }
        };
        Self {
            index: read_or(&server.index_file, FALLBACK_INDEX),
            login: read_or(&server.login_file, FALLBACK_LOGIN),
            chat: read_or(&server.chat_file, FALLBACK_INDEX),
            not_found: read_or(&server.not_found_file, FALLBACK_NOT_FOUND),
            favicon,
            server_name: server.server_name.clone(),
            domain: server.domain.clone(),
        }
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn chat(&self) -> &str {
        &self.chat
    }

    pub fn not_found(&self) -> &str {
        &self.not_found
    }

    pub fn favicon(&self) -> Bytes {
        self.favicon.clone()
    }

    /// Login page with its placeholders filled in.
    pub fn login(&self, failed: bool) -> String {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        self.login
            .replace("{login_failed}", if failed { "1" } else { "0" })
            .replace("{timestamp}", &timestamp.to_string())
            .replace("{server_name}", &self.server_name)
            .replace("{domain}", &self.domain)
    }
}

fn read_page(path: &Path) -> Result<String, RenderError> {
    std::fs::read_to_string(path).map_err(|source| RenderError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn read_or(path: &Path, fallback: &str) -> String {
    read_page(path).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Using built-in page");
        fallback.to_string()
    })
}

/// A UTF-8 HTML response with an exact length.
pub fn html_response(status: StatusCode, body: impl Into<String>) -> Response {
    let body: String = body.into();
    (
        status,
        [(header::CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"))],
        Body::from(body),
    )
        .into_response()
}
