//! Link rewriting inside HTML bodies.
//!
//! A byte scan, not an HTML parse: at every `"` or `'` the following text is
//! checked against the four URL prefixes and, on a match, this server's
//! prefix is inserted after the quote. Text that already starts with this
//! server's prefix is left alone, which makes the rewrite idempotent.

use super::RewriteContext;

/// Rewrite quoted URL prefixes so they point back through the proxy.
///
/// | found         | becomes                           |
/// |---------------|-----------------------------------|
/// | `"http://…`   | `"<origin>http://…`               |
/// | `"https://…`  | `"<origin>https://…`              |
/// | `"//host…`    | `"<origin><scheme>://host…`       |
/// | `"/path…`     | `"<origin><site>/path…`           |
pub fn rewrite_links(body: &[u8], ctx: &RewriteContext) -> Vec<u8> {
    let origin = ctx.origin().as_bytes();
    let scheme_prefix = format!("{}{}:", ctx.origin(), ctx.scheme());
    let site_prefix = format!("{}{}", ctx.origin(), ctx.site());

    let mut out = Vec::with_capacity(body.len() + body.len() / 16);
    let mut copied = 0;

    for (i, &byte) in body.iter().enumerate() {
        if byte != b'"' && byte != b'\'' {
            continue;
        }
        let rest = &body[i + 1..];
        if rest.starts_with(origin) {
            continue;
        }
        let insert: &[u8] = if rest.starts_with(b"http://") || rest.starts_with(b"https://") {
            origin
        } else if rest.starts_with(b"//") {
            scheme_prefix.as_bytes()
        } else if rest.starts_with(b"/") {
            site_prefix.as_bytes()
        } else {
            continue;
        };
        out.extend_from_slice(&body[copied..=i]);
        out.extend_from_slice(insert);
        copied = i + 1;
    }

    out.extend_from_slice(&body[copied..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::test_context;

    fn rewrite(body: &str) -> String {
        let ctx = test_context("https://origin.example/dir/page.html");
        String::from_utf8(rewrite_links(body.as_bytes(), &ctx)).unwrap()
    }

    #[test]
    fn absolute_links_get_server_prefix() {
        assert_eq!(
            rewrite(r#"<a href="http://a.com/x">"#),
            r#"<a href="http://localhost:8080/http://a.com/x">"#
        );
        assert_eq!(
            rewrite("<img src='https://b.com/i.png'>"),
            "<img src='http://localhost:8080/https://b.com/i.png'>"
        );
    }

    #[test]
    fn scheme_relative_links_take_target_scheme() {
        assert_eq!(
            rewrite(r#"<script src="//cdn.example/app.js">"#),
            r#"<script src="http://localhost:8080/https://cdn.example/app.js">"#
        );
    }

    #[test]
    fn root_relative_links_take_target_site() {
        assert_eq!(
            rewrite(r#"<a href="/about">x</a><a href='/'>"#),
            r#"<a href="http://localhost:8080/https://origin.example/about">x</a><a href='http://localhost:8080/https://origin.example/'>"#
        );
    }

    #[test]
    fn other_quoted_text_is_untouched() {
        let body = r#"<a href="page2.html" title='hi "there"'>#</a> "mailto:x" ''"#;
        assert_eq!(rewrite(body), body);
    }

    #[test]
    fn rewriting_twice_equals_rewriting_once() {
        let body = concat!(
            r#"<a href="http://a.com/">"#,
            r#"<a href='https://a.com/'>"#,
            r#"<a href="//a.com/">"#,
            r#"<a href='/a'>"#,
        );
        let once = rewrite(body);
        assert_eq!(rewrite(&once), once);
    }

    #[test]
    fn tolerates_truncated_markup() {
        assert_eq!(rewrite("<a href=\""), "<a href=\"");
        assert_eq!(rewrite("'/"), "'http://localhost:8080/https://origin.example/");
        assert_eq!(rewrite(""), "");
    }

    #[test]
    fn non_utf8_bytes_pass_through() {
        let ctx = test_context("http://origin.example/");
        let body = b"\xff\xfe\"/x\"\x80";
        let out = rewrite_links(body, &ctx);
        assert!(out.starts_with(b"\xff\xfe\"http://localhost:8080/http://origin.example/x\""));
        assert!(out.ends_with(b"\x80"));
    }
}
