//! Proxy target extraction.
//!
//! # Responsibilities
//! - Recognise `/<http|https>://…` paths as direct targets
//! - Read a `url` query parameter as a target (scheme defaults to https)
//! - Auto-prefix bare domains whose last label is a public suffix
//! - Resolve stray root-relative requests against the page that issued them
//!
//! # Design Decisions
//! - Domain detection is a hand-written label scan, no regex
//! - Asset paths are checked segment by segment, never canonicalized

use axum::http::Uri;
use url::Url;

const MAX_LABEL_LEN: usize = 63;

/// `/https://host/p?q` → `https://host/p?q`.
pub fn direct_target(uri: &Uri) -> Option<Url> {
    let rest = uri.path().strip_prefix('/')?;
    if !is_absolute_http(rest) {
        return None;
    }
    parse_with_query(rest, uri.query())
}

/// `?url=example.com/x` → `https://example.com/x`.
pub fn query_target(uri: &Uri) -> Option<Url> {
    let query = uri.query()?;
    let (_, value) = url::form_urlencoded::parse(query.as_bytes()).find(|(key, _)| key == "url")?;
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let candidate = if is_absolute_http(value) {
        value.to_string()
    } else {
        format!("https://{}", value.trim_start_matches('/'))
    };
    Url::parse(&candidate).ok().filter(|u| u.has_host())
}

/// `/example.com/x` → `https://example.com/x` when `example.com` ends in a
/// known public suffix.
pub fn domain_target(uri: &Uri) -> Option<Url> {
    let rest = uri.path().strip_prefix('/')?;
    if !starts_with_domain(rest) {
        return None;
    }
    parse_with_query(&format!("https://{rest}"), uri.query())
}

/// Resolve a non-proxy path against the site of the page that requested it.
///
/// `referer` is the raw header; `origin` is this server's external prefix,
/// which is stripped before parsing.
pub fn referer_target(uri: &Uri, referer: &str, origin: &str) -> Option<Url> {
    let upstream_page = referer.strip_prefix(origin)?;
    let page = Url::parse(upstream_page).ok()?;
    if !matches!(page.scheme(), "http" | "https") || !page.has_host() {
        return None;
    }
    let site = page.origin().ascii_serialization();
    parse_with_query(&format!("{site}{}", uri.path()), uri.query())
}

fn is_absolute_http(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

fn parse_with_query(base: &str, query: Option<&str>) -> Option<Url> {
    let raw = match query {
        Some(q) => format!("{base}?{q}"),
        None => base.to_string(),
    };
    Url::parse(&raw).ok().filter(|u| u.has_host())
}

/// Whether `s` begins with two or more DNS labels and the last of them is a
/// known top-level suffix. The whole string must be 3..=255 bytes.
pub fn starts_with_domain(s: &str) -> bool {
    if !(3..=255).contains(&s.len()) {
        return false;
    }
    let bytes = s.as_bytes();
    let mut pos = 0;
    let mut labels = 0;
    let mut last = "";

    loop {
        let start = pos;
        if !bytes.get(pos).is_some_and(u8::is_ascii_alphanumeric) {
            break;
        }
        pos += 1;
        while bytes.get(pos).is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'-') {
            pos += 1;
        }
        if pos - start > MAX_LABEL_LEN {
            return false;
        }
        labels += 1;
        last = &s[start..pos];

        if bytes.get(pos) == Some(&b'.') && bytes.get(pos + 1).is_some_and(u8::is_ascii_alphanumeric) {
            pos += 1;
        } else {
            break;
        }
    }

    labels >= 2 && is_known_tld(last)
}

fn is_known_tld(label: &str) -> bool {
    let label = label.to_ascii_lowercase();
    psl::suffix(label.as_bytes()).is_some_and(|suffix| suffix.is_known())
}

/// A relative asset path is safe when no segment is `..` and it does not
/// start at the filesystem root.
pub fn is_safe_asset_path(relative: &str) -> bool {
    !relative.is_empty()
        && !relative.starts_with('/')
        && !relative.contains('\\')
        && relative.split('/').all(|segment| segment != ".." && !segment.contains(".."))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }

    #[test]
    fn direct_targets_keep_path_and_query() {
        assert_eq!(
            direct_target(&uri("/https://example.com/a/b?x=1")).unwrap().as_str(),
            "https://example.com/a/b?x=1"
        );
        assert_eq!(
            direct_target(&uri("/http://example.com")).unwrap().as_str(),
            "http://example.com/"
        );
        assert!(direct_target(&uri("/static/app.js")).is_none());
        assert!(direct_target(&uri("/https://")).is_none());
    }

    #[test]
    fn url_parameter_defaults_to_https() {
        assert_eq!(
            query_target(&uri("/?url=example.com/news")).unwrap().as_str(),
            "https://example.com/news"
        );
        assert_eq!(
            query_target(&uri("/anything?url=http%3A%2F%2Fexample.org%2Fp%3Fq%3D1")).unwrap().as_str(),
            "http://example.org/p?q=1"
        );
        assert!(query_target(&uri("/?url=")).is_none());
        assert!(query_target(&uri("/?other=1")).is_none());
    }

    #[test]
    fn bare_domains_are_recognised() {
        assert!(starts_with_domain("www.example.com/path"));
        assert!(starts_with_domain("example.co.uk"));
        assert!(starts_with_domain("EXAMPLE.ORG"));
        assert!(!starts_with_domain("index.html"));
        assert!(!starts_with_domain("login"));
        assert!(!starts_with_domain("-bad.com"));
        assert!(!starts_with_domain("a."));

        assert_eq!(
            domain_target(&uri("/www.example.com/s?wd=1")).unwrap().as_str(),
            "https://www.example.com/s?wd=1"
        );
        assert!(domain_target(&uri("/favicon.html")).is_none());
    }

    #[test]
    fn referer_completion_uses_site_only() {
        let target = referer_target(
            &uri("/api/data?x=1"),
            "http://localhost:8080/https://example.com/dir/page",
            "http://localhost:8080/",
        )
        .unwrap();
        assert_eq!(target.as_str(), "https://example.com/api/data?x=1");

        assert!(referer_target(&uri("/x"), "http://localhost:8080/", "http://localhost:8080/").is_none());
        assert!(referer_target(&uri("/x"), "https://elsewhere.example/", "http://localhost:8080/").is_none());
    }

    #[test]
    fn asset_paths_reject_traversal() {
        assert!(is_safe_asset_path("css/site.css"));
        assert!(!is_safe_asset_path("../secret"));
        assert!(!is_safe_asset_path("a/../../b"));
        assert!(!is_safe_asset_path("/etc/passwd"));
        assert!(!is_safe_asset_path("a\\..\\b"));
        assert!(!is_safe_asset_path(""));
    }
}
