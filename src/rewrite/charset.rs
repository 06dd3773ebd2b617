//! HTML re-encoding to UTF-8.

use encoding_rs::{Encoding, UTF_8};

pub const UTF8_HTML: &str = "text/html; charset=utf-8";
pub const ASCII_HTML: &str = "text/html; charset=us-ascii";

/// How far into a document a `<meta charset>` is looked for.
const META_SNIFF_LIMIT: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcoded {
    pub body: Vec<u8>,
    /// Content type to send with `body`.
    pub content_type: &'static str,
    /// Set when the declared encoding did not fit and bytes were dropped.
    pub lossy: bool,
}

/// Decode an HTML body under its declared encoding and re-encode as UTF-8.
///
/// The encoding is taken from a byte-order mark, then the `Content-Type`
/// charset, then an early `<meta charset>`, defaulting to UTF-8. If the body
/// is not valid under that encoding, non-ASCII bytes are dropped instead.
pub fn transcode_html(body: &[u8], content_type: Option<&str>) -> Transcoded {
    let (encoding, body) = match Encoding::for_bom(body) {
        Some((encoding, bom_len)) => (encoding, &body[bom_len..]),
        None => (
            content_type
                .and_then(charset_param)
                .or_else(|| sniff_meta_charset(body))
                .and_then(|label| Encoding::for_label(label.as_bytes()))
                .unwrap_or(UTF_8),
            body,
        ),
    };

    match encoding.decode_without_bom_handling_and_without_replacement(body) {
        Some(text) => Transcoded {
            body: text.into_owned().into_bytes(),
            content_type: UTF8_HTML,
            lossy: false,
        },
        None => {
            tracing::warn!(encoding = encoding.name(), "HTML not decodable, falling back to ASCII");
            Transcoded {
                body: body.iter().copied().filter(u8::is_ascii).collect(),
                content_type: ASCII_HTML,
                lossy: true,
            }
        }
    }
}

fn charset_param(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
    })
}

fn sniff_meta_charset(body: &[u8]) -> Option<String> {
    let head = &body[..body.len().min(META_SNIFF_LIMIT)];
    let head = String::from_utf8_lossy(head).to_ascii_lowercase();
    let start = head.find("charset=")? + "charset=".len();
    let label: String = head[start..]
        .trim_start_matches(['"', '\''])
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    (!label.is_empty()).then_some(label)
}
