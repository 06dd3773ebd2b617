//! Inbound request → upstream request headers.

use axum::http::header::{
    HeaderMap, HeaderValue, ACCEPT_ENCODING, ACCEPT_LANGUAGE, CONNECTION, CONTENT_LENGTH, HOST,
    ORIGIN, REFERER, UPGRADE, USER_AGENT,
};

use crate::config::ProxyConfig;
use crate::rewrite::RewriteContext;
use crate::security::headers::{strip_cookie, strip_request_headers};

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/115.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 13_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.5 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/115.0.0.0 Safari/537.36",
];

/// Per-deployment knobs for the request transform.
#[derive(Debug, Clone)]
pub struct RequestPolicy {
    pub session_cookie: String,
    pub default_accept_language: String,
    pub randomize_user_agent: bool,
}

impl RequestPolicy {
    pub fn from_config(config: &ProxyConfig) -> Self {
        Self {
            session_cookie: config.server.session_cookie_name.clone(),
            default_accept_language: config.upstream.default_accept_language.clone(),
            randomize_user_agent: config.upstream.randomize_user_agent,
        }
    }
}

pub fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}

/// Whether the client asked to keep its connection open.
pub fn wants_keep_alive(headers: &HeaderMap) -> bool {
    headers
        .get(CONNECTION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("keep-alive"))
}

/// Build the header set sent to the origin. `Host` is left to the client
/// library, which derives it from the target URL.
pub fn upstream_headers(incoming: &HeaderMap, ctx: &RewriteContext, policy: &RequestPolicy) -> HeaderMap {
    let keep_alive = wants_keep_alive(incoming);
    let mut headers = incoming.clone();
    strip_request_headers(&mut headers);
    headers.remove(HOST);
    headers.remove(CONTENT_LENGTH);
    strip_cookie(&mut headers, &policy.session_cookie);

    if let Some(referer) = headers.get(REFERER).and_then(|v| v.to_str().ok()) {
        let stripped = referer.replace(ctx.origin(), "");
        match HeaderValue::from_str(&stripped) {
            Ok(value) if !stripped.is_empty() => {
                headers.insert(REFERER, value);
            }
            _ => {
                headers.remove(REFERER);
            }
        }
    }

    if headers.contains_key(ORIGIN) {
        if let Ok(site) = HeaderValue::from_str(ctx.site()) {
            headers.insert(ORIGIN, site);
        }
    }

    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
    headers.insert(
        CONNECTION,
        HeaderValue::from_static(if keep_alive { "keep-alive" } else { "close" }),
    );

    if !headers.contains_key(ACCEPT_LANGUAGE) {
        if let Ok(value) = HeaderValue::from_str(&policy.default_accept_language) {
            headers.insert(ACCEPT_LANGUAGE, value);
        }
    }

    if policy.randomize_user_agent {
        let agent = USER_AGENTS[fastrand::usize(..USER_AGENTS.len())];
        headers.insert(USER_AGENT, HeaderValue::from_static(agent));
    }

    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::test_context;

    fn policy() -> RequestPolicy {
        RequestPolicy {
            session_cookie: "silkroad_session".into(),
            default_accept_language: "zh-CN,cn;q=0.9".into(),
            randomize_user_agent: true,
        }
    }

    fn incoming(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn rewrites_identity_headers() {
        let ctx = test_context("https://origin.example/page");
        let headers = upstream_headers(
            &incoming(&[
                ("host", "localhost:8080"),
                ("referer", "http://localhost:8080/https://origin.example/prev"),
                ("origin", "http://localhost:8080"),
                ("accept-encoding", "gzip, br"),
                ("x-forwarded-for", "10.0.0.1"),
                ("cookie", "silkroad_session=tok; site=1"),
                ("range", "bytes=0-99"),
            ]),
            &ctx,
            &policy(),
        );

        assert!(headers.get(HOST).is_none());
        assert!(headers.get("x-forwarded-for").is_none());
        assert_eq!(headers.get(REFERER).unwrap(), "https://origin.example/prev");
        assert_eq!(headers.get(ORIGIN).unwrap(), "https://origin.example");
        assert_eq!(headers.get(ACCEPT_ENCODING).unwrap(), "identity");
        assert_eq!(headers.get("cookie").unwrap(), "site=1");
        assert_eq!(headers.get("range").unwrap(), "bytes=0-99");
        assert_eq!(headers.get(ACCEPT_LANGUAGE).unwrap(), "zh-CN,cn;q=0.9");
        assert!(USER_AGENTS.contains(&headers.get(USER_AGENT).unwrap().to_str().unwrap()));
    }

    #[test]
    fn connection_follows_client() {
        let ctx = test_context("https://origin.example/");
        let kept = upstream_headers(&incoming(&[("connection", "Keep-Alive")]), &ctx, &policy());
        assert_eq!(kept.get(CONNECTION).unwrap(), "keep-alive");

        let closed = upstream_headers(&incoming(&[]), &ctx, &policy());
        assert_eq!(closed.get(CONNECTION).unwrap(), "close");
    }

    #[test]
    fn existing_language_and_agent_kept_when_configured() {
        let ctx = test_context("https://origin.example/");
        let mut policy = policy();
        policy.randomize_user_agent = false;
        let headers = upstream_headers(
            &incoming(&[("accept-language", "en"), ("user-agent", "curl/8")]),
            &ctx,
            &policy,
        );
        assert_eq!(headers.get(ACCEPT_LANGUAGE).unwrap(), "en");
        assert_eq!(headers.get(USER_AGENT).unwrap(), "curl/8");
        assert!(headers.get(ORIGIN).is_none());
    }

    #[test]
    fn detects_websocket_upgrade() {
        assert!(is_websocket_upgrade(&incoming(&[("upgrade", "WebSocket")])));
        assert!(!is_websocket_upgrade(&incoming(&[("upgrade", "h2c")])));
    }
}
