//! Header hygiene for forwarded requests.
//!
//! # Responsibilities
//! - Drop client-identifying and CDN/tracing headers before they reach an origin
//! - Drop hop-by-hop headers, which describe only the inbound connection
//! - Read and strip this proxy's own session cookie
//!
//! # Design Decisions
//! - Blocklist, not allowlist: unknown headers are forwarded so sites work
//! - Name comparison is case-insensitive (`HeaderName` is lowercase)

use axum::http::header::{HeaderMap, HeaderValue, COOKIE};

/// Headers that reveal the client or the infrastructure in front of us.
const BLOCKED_REQUEST_HEADERS: &[&str] = &[
    "cf-connecting-ip",
    "x-forwarded-for",
    "x-real-ip",
    "true-client-ip",
    "x-vercel-deployment-url",
    "x-vercel-forwarded-for",
    "x-forwarded-host",
    "x-forwarded-port",
    "x-forwarded-proto",
    "x-vercel-id",
    "baggage",
    "cdn-loop",
    "cf-ray",
    "cf-visitor",
    "cf-ipcountry",
    "cf-worker",
    "x-amzn-trace-id",
    "x-cache",
    "x-request-id",
    "forwarded",
    "via",
];

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub fn is_blocked(name: &str) -> bool {
    BLOCKED_REQUEST_HEADERS.contains(&name)
}

pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.contains(&name)
}

/// Remove blocked and hop-by-hop headers in place.
pub fn strip_request_headers(headers: &mut HeaderMap) {
    let doomed: Vec<_> = headers
        .keys()
        .filter(|name| is_blocked(name.as_str()) || is_hop_by_hop(name.as_str()))
        .cloned()
        .collect();
    for name in doomed {
        headers.remove(&name);
    }
}

/// Iterate `name=value` pairs over every `Cookie` header. Pairs with an empty
/// name or value are skipped.
fn cookie_pairs(headers: &HeaderMap) -> impl Iterator<Item = (&str, &str)> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (!name.is_empty() && !value.is_empty()).then_some((name, value))
        })
}

/// Value of cookie `name`, if the request carries one.
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    cookie_pairs(headers).find(|(n, _)| *n == name).map(|(_, v)| v)
}

/// Remove cookie `name`, collapsing the rest into a single `Cookie` header.
pub fn strip_cookie(headers: &mut HeaderMap, name: &str) {
    if !headers.contains_key(COOKIE) {
        return;
    }
    let kept: Vec<String> = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .filter(|pair| pair.split_once('=').map_or(true, |(n, _)| n != name))
        .map(str::to_string)
        .collect();

    headers.remove(COOKIE);
    if !kept.is_empty() {
        if let Ok(value) = HeaderValue::from_str(&kept.join("; ")) {
            headers.insert(COOKIE, value);
        }
    }
}
