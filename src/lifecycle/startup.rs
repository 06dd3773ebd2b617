//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize every shared service in dependency order
//! - Restore persisted sessions and reset the cache when configured
//! - Hand back one bundle that the HTTP and admin servers share
//!
//! # Design Decisions
//! - Fail fast: a missing credentials file or corrupt session file is fatal
//! - Local pages and injection scripts degrade to built-ins with a warning

use std::sync::Arc;

use thiserror::Error;

use crate::cache::ResponseCache;
use crate::config::ProxyConfig;
use crate::http::server::AppState;
use crate::proxy::ProxyPipeline;
use crate::render::{Pages, ScriptInjector};
use crate::session::{Credentials, SessionError, SessionStore};
use crate::upstream::ClientPool;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to load credentials from {path}: {source}")]
    Credentials {
        path: String,
        #[source]
        source: SessionError,
    },

    #[error("failed to restore sessions: {0}")]
    Sessions(#[source] SessionError),
}

/// Shared services, built once per process.
#[derive(Clone)]
pub struct Services {
    pub sessions: Arc<SessionStore>,
    pub credentials: Arc<Credentials>,
    pub cache: Arc<ResponseCache>,
    pub pool: Arc<ClientPool>,
    pub pages: Arc<Pages>,
    pub pipeline: Arc<ProxyPipeline>,
}

impl Services {
    pub fn build(config: &ProxyConfig) -> Result<Self, StartupError> {
        let credentials = Credentials::load(&config.server.credentials_file).map_err(|source| {
            StartupError::Credentials {
                path: config.server.credentials_file.display().to_string(),
                source,
            }
        })?;
        if credentials.is_empty() {
            tracing::warn!("No users configured; nobody can log in");
        }

        let sessions = SessionStore::load(&config.sessions).map_err(StartupError::Sessions)?;

        let cache = ResponseCache::new(&config.cache);
        if config.cache.clear_on_start {
            cache.clear(None);
        } else if let Err(e) = cache.layout().ensure_dirs() {
            tracing::warn!(error = %e, "Failed to create cache directories");
        }

        let pages = Arc::new(Pages::load(&config.server));
        let injector = ScriptInjector::load(&config.inject);
        let pool = ClientPool::new(&config.upstream);
        let cache = Arc::new(cache);
        let pipeline = ProxyPipeline::new(config, pool.clone(), cache.clone(), injector, pages.clone());

        tracing::info!(
            users = credentials.len(),
            sessions = sessions.count(),
            cache_enabled = cache.is_enabled(),
            pool_capacity = config.upstream.pool_capacity,
            "Services initialized"
        );

        Ok(Self {
            sessions: Arc::new(sessions),
            credentials: Arc::new(credentials),
            cache,
            pool,
            pages,
            pipeline: Arc::new(pipeline),
        })
    }

    /// State for the public HTTP server.
    pub fn app_state(&self, config: &ProxyConfig) -> AppState {
        AppState::new(
            &config.server,
            self.sessions.clone(),
            self.credentials.clone(),
            self.pipeline.clone(),
            self.pages.clone(),
        )
    }
}
