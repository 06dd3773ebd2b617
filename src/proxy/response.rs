//! Upstream response → client response.
//!
//! Header transform plus the streaming body path: upstream bytes are
//! re-framed into fixed 8 KiB chunks and, for cacheable responses, copied
//! aside so the full body can be stored once the stream completes.

use std::pin::Pin;
use std::sync::Arc;

use axum::http::header::{HeaderMap, HeaderName, HeaderValue, ACCESS_CONTROL_ALLOW_ORIGIN, LOCATION, SET_COOKIE};
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures_util::{stream, Stream, StreamExt, TryStreamExt};

use crate::cache::{HeaderSnapshot, ResponseCache};
use crate::rewrite::{rewrite_location, rewrite_set_cookie, RewriteContext};

/// Size of every streamed chunk except the last.
pub const STREAM_CHUNK_SIZE: usize = 8 * 1024;

/// Upstream headers copied to the client unchanged.
const PASSTHROUGH: &[&str] = &["content-type", "content-range", "content-disposition", "accept-ranges"];

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, BoxError>> + Send>>;

/// Flatten a header map: lowercase names, repeated values joined by `", "`.
pub fn snapshot(headers: &HeaderMap) -> HeaderSnapshot {
    let mut out = HeaderSnapshot::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else { continue };
        out.entry(name.as_str().to_string())
            .and_modify(|joined: &mut String| {
                joined.push_str(", ");
                joined.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    out
}

pub fn content_type(head: &HeaderSnapshot) -> &str {
    head.get("content-type").map(String::as_str).unwrap_or_default()
}

pub fn content_length(head: &HeaderSnapshot) -> Option<u64> {
    head.get("content-length").and_then(|v| v.trim().parse().ok())
}

pub fn is_html(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains("text/html")
}

/// Headers sent to the client for a proxied response.
pub fn client_headers(head: &HeaderSnapshot, ctx: &RewriteContext, now: DateTime<Utc>) -> HeaderMap {
    let mut out = HeaderMap::new();

    for name in PASSTHROUGH {
        if let Some(value) = head.get(*name).and_then(|v| HeaderValue::from_str(v).ok()) {
            out.insert(HeaderName::from_static(name), value);
        }
    }

    if let Some(location) = head.get("location") {
        match HeaderValue::from_str(&rewrite_location(location, ctx)) {
            Ok(value) => {
                out.insert(LOCATION, value);
            }
            Err(e) => tracing::debug!(location, error = %e, "Dropping unrepresentable Location"),
        }
    }

    if let Some(raw) = head.get("set-cookie") {
        for cookie in rewrite_set_cookie(raw, ctx, now) {
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                out.append(SET_COOKIE, value);
            }
        }
    }

    out.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    out
}

/// Copies a streamed body aside and stores it in the cache at end of stream.
#[derive(Debug)]
pub struct CacheTee {
    cache: Arc<ResponseCache>,
    url: String,
    content_type: String,
    headers: HeaderSnapshot,
    buf: BytesMut,
    limit: u64,
}

impl CacheTee {
    pub fn new(cache: Arc<ResponseCache>, url: String, headers: HeaderSnapshot) -> Self {
        let limit = cache.max_storable_bytes();
        Self {
            content_type: content_type(&headers).to_string(),
            cache,
            url,
            headers,
            buf: BytesMut::new(),
            limit,
        }
    }

    /// Returns false once the body has outgrown what may be cached.
    fn push(&mut self, bytes: &[u8]) -> bool {
        if (self.buf.len() + bytes.len()) as u64 > self.limit {
            tracing::debug!(url = %self.url, limit = self.limit, "Body too large to cache");
            return false;
        }
        self.buf.extend_from_slice(bytes);
        true
    }

    fn finish(self) {
        tokio::task::spawn_blocking(move || {
            self.cache
                .store(&self.url, &self.buf, &self.content_type, Some(&self.headers));
        });
    }
}

pub fn live_stream(response: reqwest::Response) -> ByteStream {
    Box::pin(response.bytes_stream().map_err(|e| Box::new(e) as BoxError))
}

pub fn bytes_stream(bytes: Bytes) -> ByteStream {
    Box::pin(stream::once(async move { Ok(bytes) }))
}

/// `prefix` followed by the rest of `inner`.
pub fn prepend(prefix: Bytes, inner: ByteStream) -> ByteStream {
    Box::pin(bytes_stream(prefix).chain(inner))
}

struct Rechunk {
    inner: ByteStream,
    pending: BytesMut,
    done: bool,
    tee: Option<CacheTee>,
}

/// Re-frame `inner` into `STREAM_CHUNK_SIZE` chunks. An upstream error ends
/// the stream and abandons the cache copy.
pub fn rechunk(inner: ByteStream, tee: Option<CacheTee>) -> impl Stream<Item = Result<Bytes, BoxError>> + Send {
    let state = Rechunk {
        inner,
        pending: BytesMut::new(),
        done: false,
        tee,
    };
    stream::unfold(state, |mut st| async move {
        loop {
            if st.pending.len() >= STREAM_CHUNK_SIZE {
                let chunk = st.pending.split_to(STREAM_CHUNK_SIZE).freeze();
                return Some((Ok(chunk), st));
            }
            if st.done {
                if st.pending.is_empty() {
                    if let Some(tee) = st.tee.take() {
                        tee.finish();
                    }
                    return None;
                }
                let chunk = st.pending.split().freeze();
                return Some((Ok(chunk), st));
            }
            match st.inner.next().await {
                Some(Ok(bytes)) => {
                    if let Some(tee) = st.tee.as_mut() {
                        if !tee.push(&bytes) {
                            st.tee = None;
                        }
                    }
                    st.pending.extend_from_slice(&bytes);
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Upstream body failed mid-stream");
                    st.tee = None;
                    st.pending.clear();
                    st.done = true;
                    return Some((Err(e), st));
                }
                None => st.done = true,
            }
        }
    })
}
