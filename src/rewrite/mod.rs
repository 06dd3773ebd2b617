//! Content rewriting subsystem.
//!
//! Pure functions over response bytes and header values that keep a proxied
//! page routing through this server.
//!
//! # Data Flow
//! ```text
//! Upstream HTML body
//!     → charset.rs (declared/sniffed encoding → UTF-8, lossy ASCII fallback)
//!     → links.rs (quoted absolute, scheme-relative, root-relative prefixes)
//!
//! Upstream headers
//!     → location.rs (redirect target → proxied absolute link)
//!     → cookies.rs (split joined Set-Cookie, pin Expires/Domain/Path/Secure)
//! ```

pub mod charset;
pub mod cookies;
pub mod links;
pub mod location;

use url::Url;

use crate::config::ServerConfig;

pub use charset::{transcode_html, Transcoded};
pub use cookies::rewrite_set_cookie;
pub use links::rewrite_links;
pub use location::rewrite_location;

/// Everything the rewriters need to know about one proxied exchange.
#[derive(Debug, Clone)]
pub struct RewriteContext {
    /// This server's external prefix, e.g. `http://localhost:8080/`.
    origin: String,
    /// This server's cookie domain.
    domain: String,
    /// Drop `Secure` from cookies when this server is reached over plain HTTP.
    strip_secure: bool,
    target: Url,
    /// `scheme://host[:port]` of the target.
    site: String,
}

impl RewriteContext {
    pub fn new(server: &ServerConfig, target: Url) -> Self {
        Self::from_parts(&server.origin, &server.domain, server.is_plain_http(), target)
    }

    pub fn from_parts(origin: &str, domain: &str, plain_http: bool, target: Url) -> Self {
        let site = target.origin().ascii_serialization();
        Self {
            origin: origin.to_string(),
            domain: domain.to_string(),
            strip_secure: plain_http,
            target,
            site,
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn strip_secure(&self) -> bool {
        self.strip_secure
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    pub fn scheme(&self) -> &str {
        self.target.scheme()
    }

    pub fn site(&self) -> &str {
        &self.site
    }
}

#[cfg(test)]
pub(crate) fn test_context(target: &str) -> RewriteContext {
    RewriteContext::from_parts(
        "http://localhost:8080/",
        "localhost",
        true,
        Url::parse(target).expect("test target"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn site_omits_default_port() {
        assert_eq!(test_context("https://origin.example/a/b").site(), "https://origin.example");
        assert_eq!(test_context("http://origin.example:8081/").site(), "http://origin.example:8081");
    }
}
