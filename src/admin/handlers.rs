use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;
use crate::cache::{CacheUsage, SweepStats};
use crate::session::RecycleStats;
use crate::upstream::PoolStats;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub live_sessions: usize,
    pub pool: PoolStats,
}

#[derive(Serialize)]
pub struct SessionSummary {
    pub live_sessions: usize,
}

#[derive(Serialize)]
pub struct CacheSummary {
    pub enabled: bool,
    pub usage: CacheUsage,
    pub pool: PoolStats,
}

#[derive(Deserialize)]
pub struct ClearParams {
    pub url: Option<String>,
}

#[derive(Serialize)]
pub struct Cleared {
    pub cleared: String,
}

type AdminResult<T> = Result<Json<T>, (StatusCode, String)>;

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started.elapsed().as_secs(),
        live_sessions: state.services.sessions.count(),
        pool: state.services.pool.stats(),
    })
}

pub async fn get_sessions(State(state): State<AdminState>) -> Json<SessionSummary> {
    Json(SessionSummary {
        live_sessions: state.services.sessions.count(),
    })
}

pub async fn recycle_sessions(State(state): State<AdminState>) -> AdminResult<RecycleStats> {
    let sessions = state.services.sessions.clone();
    blocking(move || sessions.recycle()).await
}

pub async fn get_cache(State(state): State<AdminState>) -> AdminResult<CacheSummary> {
    let cache = state.services.cache.clone();
    let enabled = cache.is_enabled();
    let usage = blocking(move || cache.usage()).await?.0;
    Ok(Json(CacheSummary {
        enabled,
        usage,
        pool: state.services.pool.stats(),
    }))
}

pub async fn clear_cache(
    State(state): State<AdminState>,
    Query(params): Query<ClearParams>,
) -> AdminResult<Cleared> {
    let cache = state.services.cache.clone();
    let url = params.url.filter(|u| !u.is_empty());
    let cleared = url.clone().unwrap_or_else(|| "all".to_string());
    let _ = blocking(move || cache.clear(url.as_deref())).await?;
    tracing::info!(target_url = %cleared, "Cache cleared via admin API");
    Ok(Json(Cleared { cleared }))
}

pub async fn sweep_cache(State(state): State<AdminState>) -> AdminResult<SweepStats> {
    let cache = state.services.cache.clone();
    blocking(move || cache.sweep()).await
}

async fn blocking<T, F>(job: F) -> AdminResult<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map(Json)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}
