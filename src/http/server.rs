//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the dispatch handler
//! - Wire up middleware (request ID, tracing, no-cache headers, timeout,
//!   body limit)
//! - Run the accept loop: one task per connection, bounded by the
//!   listener's worker pool
//! - Serve HTTP/1.1 (and h2 prior knowledge) via hyper-util, optionally
//!   over TLS

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::header::{CACHE_CONTROL, EXPIRES, PRAGMA, SERVER};
use axum::http::{HeaderMap, HeaderValue};
use axum::Router;
use axum_server::accept::Accept;
use axum_server::tls_rustls::{RustlsAcceptor, RustlsConfig};
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::{ProxyConfig, ServerConfig};
use crate::http::handlers::dispatch;
use crate::http::request::{request_span, UuidRequestId};
use crate::net::{tls, ConnectionTracker, Listener, ListenerError};
use crate::proxy::ProxyPipeline;
use crate::render::Pages;
use crate::routing::RequestRouter;
use crate::security::headers::cookie_value;
use crate::session::{Credentials, SessionStore};

/// Slack on top of the worst-case upstream latency before a request is cut.
const REQUEST_GRACE: Duration = Duration::from_secs(10);

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<RequestRouter>,
    pub server: Arc<ServerConfig>,
    pub sessions: Arc<SessionStore>,
    pub credentials: Arc<Credentials>,
    pub pipeline: Arc<ProxyPipeline>,
    pub pages: Arc<Pages>,
    pub(crate) login_location: HeaderValue,
}

impl AppState {
    pub fn new(
        server: &ServerConfig,
        sessions: Arc<SessionStore>,
        credentials: Arc<Credentials>,
        pipeline: Arc<ProxyPipeline>,
        pages: Arc<Pages>,
    ) -> Self {
        let login_location = HeaderValue::from_str(&server.login_path)
            .unwrap_or_else(|_| HeaderValue::from_static("/login"));
        Self {
            router: Arc::new(RequestRouter::from_config(server)),
            server: Arc::new(server.clone()),
            sessions,
            credentials,
            pipeline,
            pages,
            login_location,
        }
    }

    /// Whether the request carries a live session cookie.
    pub fn is_authenticated(&self, headers: &HeaderMap) -> bool {
        cookie_value(headers, &self.server.session_cookie_name)
            .is_some_and(|token| self.sessions.is_valid(token))
    }
}

/// HTTP server for the proxy.
pub struct HttpServer {
    app: Router,
    tls: Option<RustlsAcceptor>,
    connections: ConnectionTracker,
}

impl HttpServer {
    pub fn new(config: &ProxyConfig, state: AppState) -> Self {
        Self {
            app: build_router(config, state),
            tls: None,
            connections: ConnectionTracker::new(),
        }
    }

    /// Terminate TLS on accepted connections.
    pub fn with_tls(mut self, config: RustlsConfig) -> Self {
        self.tls = Some(tls::acceptor(config));
        self
    }

    /// The fully layered router, for in-process use.
    pub fn router(&self) -> Router {
        self.app.clone()
    }

    /// Handle for waiting on open connections after `run` returns.
    pub fn connections(&self) -> ConnectionTracker {
        self.connections.clone()
    }

    /// Accept connections until `shutdown` fires. Connections already
    /// accepted keep running; use [`ConnectionTracker::drain`] to wait.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ListenerError> {
        let addr = listener.local_addr().map_err(ListenerError::Bind)?;
        tracing::info!(
            address = %addr,
            tls = self.tls.is_some(),
            "HTTP server starting"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("HTTP server stopped accepting");
                    break;
                }
                accepted = listener.accept() => {
                    let (stream, peer, permit) = match accepted {
                        Ok(accepted) => accepted,
                        Err(ListenerError::Accept(e)) => {
                            tracing::warn!(error = %e, "Accept failed");
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            continue;
                        }
                        Err(e) => return Err(e),
                    };

                    let app = self.app.clone();
                    let tls = self.tls.clone();
                    let guard = self.connections.track();
                    tokio::spawn(async move {
                        let _permit = permit;
                        if let Err(e) = serve_connection(app, stream, tls).await {
                            tracing::debug!(
                                connection_id = %guard.id(),
                                peer = %peer,
                                error = %e,
                                "Connection ended with error"
                            );
                        }
                        drop(guard);
                    });
                }
            }
        }
        Ok(())
    }
}

/// Build the Axum router with all middleware layers.
#[allow(deprecated)]
pub fn build_router(config: &ProxyConfig, state: AppState) -> Router {
    let request_timeout =
        config.upstream.worst_case_latency() + config.upstream.acquire_wait() + REQUEST_GRACE;
    let server_name = HeaderValue::from_str(&config.server.server_name)
        .unwrap_or_else(|_| HeaderValue::from_static("SilkRoad"));

    let middleware = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
        .layer(TraceLayer::new_for_http().make_span_with(request_span::<Body>))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetResponseHeaderLayer::overriding(
            CACHE_CONTROL,
            HeaderValue::from_static("no-store, no-cache, must-revalidate, max-age=0"),
        ))
        .layer(SetResponseHeaderLayer::overriding(PRAGMA, HeaderValue::from_static("no-cache")))
        .layer(SetResponseHeaderLayer::overriding(EXPIRES, HeaderValue::from_static("0")))
        .layer(SetResponseHeaderLayer::overriding(SERVER, server_name))
        .layer(RequestBodyLimitLayer::new(config.limits.max_body_bytes))
        .layer(TimeoutLayer::new(request_timeout));

    Router::new()
        .fallback(dispatch)
        .with_state(state)
        .layer(middleware)
}

async fn serve_connection(
    app: Router,
    stream: TcpStream,
    tls: Option<RustlsAcceptor>,
) -> Result<(), BoxError> {
    let service = hyper::service::service_fn(move |request: hyper::Request<Incoming>| {
        app.clone().oneshot(request.map(Body::new))
    });
    let builder = Builder::new(TokioExecutor::new());

    match tls {
        Some(acceptor) => {
            let (stream, ()) = acceptor.accept(stream, ()).await?;
            builder.serve_connection(TokioIo::new(stream), service).await
        }
        None => builder.serve_connection(TokioIo::new(stream), service).await,
    }
}
