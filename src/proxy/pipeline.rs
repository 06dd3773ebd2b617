//! Per-request orchestration: cache check, fetch with retry, rewrite, respond.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::header::{HeaderMap, HeaderValue, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use futures_util::StreamExt;
use http_body_util::LengthLimitError;
use url::Url;

use crate::cache::{HeaderSnapshot, ResponseCache};
use crate::config::{ProxyConfig, ServerConfig};
use crate::proxy::request::{is_websocket_upgrade, upstream_headers, wants_keep_alive, RequestPolicy};
use crate::proxy::response::{
    bytes_stream, client_headers, content_length, content_type, is_html, live_stream, prepend,
    rechunk, snapshot, ByteStream, CacheTee,
};
use crate::proxy::ProxyError;
use crate::render::{html_response, Pages, ScriptInjector};
use crate::resilience::{retry_transient, FetchError, RetryPolicy};
use crate::rewrite::{rewrite_links, transcode_html, RewriteContext};
use crate::upstream::ClientPool;

/// Where a response body comes from.
enum Source {
    Live(reqwest::Response),
    Cached(Bytes),
}

/// A body after the HTML size check.
enum Prepared {
    /// Complete, and no larger than the buffering threshold.
    Buffered(Bytes),
    Streaming(ByteStream),
}

#[derive(Debug)]
pub struct ProxyPipeline {
    server: ServerConfig,
    policy: RequestPolicy,
    retry: RetryPolicy,
    attempt_timeout: Duration,
    max_body_bytes: usize,
    pool: Arc<ClientPool>,
    cache: Arc<ResponseCache>,
    injector: ScriptInjector,
    pages: Arc<Pages>,
}

impl ProxyPipeline {
    pub fn new(
        config: &ProxyConfig,
        pool: Arc<ClientPool>,
        cache: Arc<ResponseCache>,
        injector: ScriptInjector,
        pages: Arc<Pages>,
    ) -> Self {
        Self {
            server: config.server.clone(),
            policy: RequestPolicy::from_config(config),
            retry: RetryPolicy::from_config(&config.upstream),
            attempt_timeout: config.upstream.timeout(),
            max_body_bytes: config.limits.max_body_bytes,
            pool,
            cache,
            injector,
            pages,
        }
    }

    /// Forward `request` to `target` and build the client response.
    pub async fn handle(&self, target: Url, request: Request<Body>) -> Response {
        let url = target.to_string();
        match self.forward(target, request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(url, error = %e, "Proxy request failed");
                e.into_response()
            }
        }
    }

    async fn forward(&self, target: Url, request: Request<Body>) -> Result<Response, ProxyError> {
        let (parts, body) = request.into_parts();
        if is_websocket_upgrade(&parts.headers) {
            return Err(ProxyError::WebSocket);
        }

        let ctx = RewriteContext::new(&self.server, target.clone());
        let keep_alive = wants_keep_alive(&parts.headers);
        let url = target.to_string();
        let is_get = parts.method == Method::GET;

        if is_get && self.cache.is_enabled() {
            if let Some(hit) = self.lookup(&url).await {
                tracing::info!(url, "Serving from cache");
                let mut head = hit.headers.clone().unwrap_or_default();
                head.entry("content-type".to_string())
                    .or_insert_with(|| hit.content_type());
                return self
                    .respond(StatusCode::OK, head, Source::Cached(hit.body), &ctx, keep_alive, None)
                    .await;
            }
        }

        let body = read_body(body, self.max_body_bytes).await?;
        let headers = upstream_headers(&parts.headers, &ctx, &self.policy);
        let response = self.fetch(parts.method, target, headers, body).await?;

        let status = response.status();
        let head = snapshot(response.headers());
        tracing::debug!(url, status = status.as_u16(), "Upstream responded");

        let cache_as = (is_get && status == StatusCode::OK).then_some(url);
        self.respond(status, head, Source::Live(response), &ctx, keep_alive, cache_as)
            .await
    }

    async fn lookup(&self, url: &str) -> Option<crate::cache::CachedResponse> {
        let cache = self.cache.clone();
        let url = url.to_string();
        match tokio::task::spawn_blocking(move || cache.lookup(&url)).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(error = %e, "Cache lookup task failed");
                None
            }
        }
    }

    async fn fetch(
        &self,
        method: Method,
        target: Url,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<reqwest::Response, FetchError> {
        let pool = self.pool.clone();
        let timeout = self.attempt_timeout;

        retry_transient(self.retry, move |attempt| {
            let pool = pool.clone();
            let method = method.clone();
            let target = target.clone();
            let headers = headers.clone();
            let body = body.clone();
            async move {
                let mut client = pool
                    .acquire()
                    .await
                    .map_err(|e| FetchError::Fatal(format!("no upstream client: {e}")))?;

                let mut request = client.request(method, target).headers(headers);
                if !body.is_empty() {
                    request = request.body(body);
                }

                match tokio::time::timeout(timeout, request.send()).await {
                    Ok(Ok(response)) => Ok(response),
                    Ok(Err(e)) => {
                        let error = FetchError::classify(&e);
                        if matches!(error, FetchError::TlsEof(_)) {
                            client.mark_unusable();
                        }
                        tracing::debug!(attempt, error = %error, "Upstream attempt failed");
                        Err(error)
                    }
                    Err(_) => {
                        tracing::debug!(attempt, ?timeout, "Upstream attempt timed out");
                        Err(FetchError::Timeout(format!("no response within {timeout:?}")))
                    }
                }
            }
        })
        .await
    }

    async fn respond(
        &self,
        status: StatusCode,
        head: HeaderSnapshot,
        source: Source,
        ctx: &RewriteContext,
        keep_alive: bool,
        cache_as: Option<String>,
    ) -> Result<Response, ProxyError> {
        let ctype = content_type(&head).to_string();
        let html = is_html(&ctype);

        if status == StatusCode::NOT_FOUND && !html {
            return Ok(html_response(StatusCode::NOT_FOUND, self.pages.not_found()));
        }

        let mut headers = client_headers(&head, ctx, Utc::now());
        headers.insert(
            CONNECTION,
            HeaderValue::from_static(if keep_alive { "keep-alive" } else { "close" }),
        );

        let threshold = self.cache.large_file_threshold();
        let declared = content_length(&head);
        let body = if html && declared.map_or(true, |len| len <= threshold) {
            buffer_up_to(source, threshold).await?
        } else {
            Prepared::Streaming(match source {
                Source::Live(response) => live_stream(response),
                Source::Cached(bytes) => bytes_stream(bytes),
            })
        };

        match body {
            Prepared::Buffered(raw) => {
                if let Some(url) = cache_as {
                    self.store(url, raw.clone(), ctype.clone(), head);
                }
                let page = transcode_html(&raw, Some(&ctype));
                let page_body = self.injector.inject(rewrite_links(&page.body, ctx));

                headers.insert(CONTENT_TYPE, HeaderValue::from_static(page.content_type));
                headers.insert(CONTENT_LENGTH, HeaderValue::from(page_body.len()));
                Ok((status, headers, Body::from(page_body)).into_response())
            }
            Prepared::Streaming(stream) => {
                let tee = cache_as
                    .filter(|_| self.cache.accepts(&ctype, declared.unwrap_or(0)))
                    .map(|url| CacheTee::new(self.cache.clone(), url, head));
                headers.remove(CONTENT_LENGTH);
                Ok((status, headers, Body::from_stream(rechunk(stream, tee))).into_response())
            }
        }
    }

    fn store(&self, url: String, body: Bytes, content_type: String, head: HeaderSnapshot) {
        if !self.cache.accepts(&content_type, body.len() as u64) {
            return;
        }
        let cache = self.cache.clone();
        tokio::task::spawn_blocking(move || {
            cache.store(&url, &body, &content_type, Some(&head));
        });
    }
}

async fn read_body(body: Body, limit: usize) -> Result<Bytes, ProxyError> {
    axum::body::to_bytes(body, limit).await.map_err(|e| {
        let inner = e.into_inner();
        let over_limit = inner.is::<LengthLimitError>()
            || inner.source().is_some_and(|source| source.is::<LengthLimitError>());
        if over_limit {
            ProxyError::BodyTooLarge { limit }
        } else {
            ProxyError::Body(inner.to_string())
        }
    })
}

/// Read a body while it stays within `threshold`; past that, hand back a
/// stream that replays what was read.
async fn buffer_up_to(source: Source, threshold: u64) -> Result<Prepared, ProxyError> {
    let response = match source {
        Source::Cached(bytes) if bytes.len() as u64 <= threshold => return Ok(Prepared::Buffered(bytes)),
        Source::Cached(bytes) => return Ok(Prepared::Streaming(bytes_stream(bytes))),
        Source::Live(response) => response,
    };

    let mut stream = live_stream(response);
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| FetchError::Fatal(e.to_string()))?;
        buf.extend_from_slice(&chunk);
        if buf.len() as u64 > threshold {
            return Ok(Prepared::Streaming(prepend(buf.freeze(), stream)));
        }
    }
    Ok(Prepared::Buffered(buf.freeze()))
}
