//! Redirect target rewriting.

use super::RewriteContext;

/// Turn an upstream `Location` into a link served by this proxy.
///
/// Relative targets are resolved against the full target URL. Values already
/// pointing through this server are returned unchanged.
pub fn rewrite_location(location: &str, ctx: &RewriteContext) -> String {
    let location = location.trim();
    let origin = ctx.origin();

    if location.starts_with(origin) {
        return location.to_string();
    }
    if location.starts_with("http://") || location.starts_with("https://") {
        return format!("{origin}{location}");
    }
    if location.starts_with("//") {
        return format!("{origin}{}:{location}", ctx.scheme());
    }
    if location.starts_with('/') {
        return format!("{origin}{}{location}", ctx.site());
    }

    match ctx.target().join(location) {
        Ok(resolved) => format!("{origin}{resolved}"),
        Err(e) => {
            tracing::debug!(location, error = %e, "Unresolvable redirect target");
            format!("{origin}{}/{location}", ctx.site())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::test_context;

    #[test]
    fn four_target_forms() {
        let ctx = test_context("https://origin.example/dir/page.html");

        assert_eq!(
            rewrite_location("http://other.example/x", &ctx),
            "http://localhost:8080/http://other.example/x"
        );
        assert_eq!(
            rewrite_location("//cdn.example/y", &ctx),
            "http://localhost:8080/https://cdn.example/y"
        );
        assert_eq!(
            rewrite_location("/foo/bar", &ctx),
            "http://localhost:8080/https://origin.example/foo/bar"
        );
        assert_eq!(
            rewrite_location("next.html?a=1", &ctx),
            "http://localhost:8080/https://origin.example/dir/next.html?a=1"
        );
    }

    #[test]
    fn parent_relative_targets_resolve() {
        let ctx = test_context("https://origin.example/a/b/c");
        assert_eq!(
            rewrite_location("../d", &ctx),
            "http://localhost:8080/https://origin.example/a/d"
        );
    }

    #[test]
    fn already_proxied_target_is_kept() {
        let ctx = test_context("https://origin.example/");
        let proxied = "http://localhost:8080/https://origin.example/login";
        assert_eq!(rewrite_location(proxied, &ctx), proxied);
    }
}
