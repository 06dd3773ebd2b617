//! `Set-Cookie` rewriting.
//!
//! Upstream cookies arrive as one `", "`-joined string. Because an `Expires`
//! date also contains `", "` (`Wed, 21 Oct 2015 …`), the split pieces are
//! re-joined wherever a piece ends inside such a date.

use chrono::{DateTime, Duration, Utc};

use super::RewriteContext;

const COOKIE_LIFETIME_HOURS: i64 = 24;

/// Split, validate and rewrite a joined `Set-Cookie` value.
///
/// Each returned string is one cookie, ready to be sent as its own header.
pub fn rewrite_set_cookie(raw: &str, ctx: &RewriteContext, now: DateTime<Utc>) -> Vec<String> {
    let expires = (now + Duration::hours(COOKIE_LIFETIME_HOURS))
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string();

    split_cookies(raw)
        .into_iter()
        .filter(|cookie| has_name_value(cookie))
        .map(|cookie| rewrite_one(&cookie, ctx, &expires))
        .collect()
}

fn split_cookies(raw: &str) -> Vec<String> {
    let mut cookies = Vec::new();
    let mut half: Option<&str> = None;

    for piece in raw.split(", ") {
        match half.take() {
            Some(head) => cookies.push(format!("{head}, {piece}")),
            None if ends_inside_expires(piece) => half = Some(piece),
            None => cookies.push(piece.to_string()),
        }
    }
    if let Some(head) = half {
        cookies.push(head.to_string());
    }
    cookies
}

/// True when the last attribute is `Expires=<weekday>` cut off by the split.
fn ends_inside_expires(piece: &str) -> bool {
    let Some(last) = piece.rsplit(';').next() else {
        return false;
    };
    let Some((name, value)) = last.split_once('=') else {
        return false;
    };
    let value = value.trim();
    name.trim().eq_ignore_ascii_case("expires")
        && !value.is_empty()
        && value.chars().all(|c| c.is_ascii_alphabetic())
}

fn has_name_value(cookie: &str) -> bool {
    cookie
        .split(';')
        .next()
        .is_some_and(|pair| pair.split_once('=').is_some_and(|(name, _)| !name.trim().is_empty()))
}

fn rewrite_one(cookie: &str, ctx: &RewriteContext, expires: &str) -> String {
    let mut parts = cookie.split(';').map(str::trim).filter(|p| !p.is_empty());
    let mut out = vec![parts.next().unwrap_or_default().to_string()];

    for attr in parts {
        let (name, value) = match attr.split_once('=') {
            Some((name, value)) => (name.trim(), Some(value.trim())),
            None => (attr, None),
        };
        match name.to_ascii_lowercase().as_str() {
            "expires" => {}
            "domain" => out.push(format!("Domain=.{}", ctx.domain())),
            "path" => match value {
                Some(path) if path.starts_with('/') => {
                    out.push(format!("Path=/{}{}", ctx.site(), path));
                }
                _ => out.push(attr.to_string()),
            },
            "secure" if ctx.strip_secure() => {}
            _ => out.push(attr.to_string()),
        }
    }

    out.push(format!("Expires={expires}"));
    out.join("; ")
}
