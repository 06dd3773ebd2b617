//! Admin API: status, sessions and cache control behind a bearer key.
//!
//! Served on its own listener, never through the proxy router.

pub mod auth;
pub mod handlers;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::config::AdminConfig;
use crate::lifecycle::Services;

#[derive(Clone)]
pub struct AdminState {
    pub services: Services,
    pub api_key: Arc<str>,
    pub started: Instant,
}

impl AdminState {
    pub fn new(config: &AdminConfig, services: Services) -> Self {
        Self {
            services,
            api_key: Arc::from(config.api_key.as_str()),
            started: Instant::now(),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/sessions", get(get_sessions))
        .route("/admin/sessions/recycle", post(recycle_sessions))
        .route("/admin/cache", get(get_cache))
        .route("/admin/cache/clear", post(clear_cache))
        .route("/admin/cache/sweep", post(sweep_cache))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}

/// Serve the admin API until `shutdown` fires.
pub async fn serve_admin(
    listener: TcpListener,
    state: AdminState,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    tracing::info!(address = %listener.local_addr()?, "Admin API listening");
    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
}
