//! Local response helpers.
//!
//! # Responsibilities
//! - Content types for static and template assets
//! - The session cookie issued after login
//! - The redirect sent to clients without a session

use std::path::Path;

use axum::http::header::{HeaderValue, LOCATION, SET_COOKIE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Duration, Utc};

/// Lifetime of an issued session cookie.
pub const SESSION_COOKIE_LIFETIME_HOURS: i64 = 24;

pub fn asset_content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "application/javascript; charset=utf-8",
        "json" => "application/json",
        "txt" => "text/plain; charset=utf-8",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "mp4" => "video/mp4",
        "mp3" => "audio/mpeg",
        "wasm" => "application/wasm",
        _ => "application/octet-stream",
    }
}

/// `Set-Cookie` value carrying a fresh session token.
pub fn session_cookie(name: &str, token: &str, now: DateTime<Utc>) -> String {
    let expires = now + Duration::hours(SESSION_COOKIE_LIFETIME_HOURS);
    format!(
        "{name}={token}; expires={}; path=/; HttpOnly",
        expires.format("%a, %d %b %Y %H:%M:%S GMT")
    )
}

/// 302 to `location`.
pub fn found(location: HeaderValue) -> Response {
    (StatusCode::FOUND, [(LOCATION, location)]).into_response()
}

/// 302 to `/` with the session cookie set.
pub fn login_success(cookie: &str) -> Response {
    let mut response = found(HeaderValue::from_static("/"));
    match HeaderValue::from_str(cookie) {
        Ok(value) => {
            response.headers_mut().insert(SET_COOKIE, value);
        }
        Err(e) => tracing::error!(error = %e, "Session cookie is not a valid header value"),
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn content_types_by_extension() {
        assert_eq!(asset_content_type(Path::new("a/site.CSS")), "text/css; charset=utf-8");
        assert_eq!(asset_content_type(Path::new("logo.png")), "image/png");
        assert_eq!(asset_content_type(Path::new("README")), "application/octet-stream");
    }

    #[test]
    fn cookie_expires_in_a_day() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(
            session_cookie("sid", "abc", now),
            "sid=abc; expires=Sat, 02 Mar 2024 12:00:00 GMT; path=/; HttpOnly"
        );
    }

    #[test]
    fn login_success_redirects_home() {
        let response = login_success("sid=abc; path=/");
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[LOCATION], "/");
        assert_eq!(response.headers()[SET_COOKIE], "sid=abc; path=/");
    }
}
