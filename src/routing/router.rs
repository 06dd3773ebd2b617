//! Route classification.
//!
//! # Responsibilities
//! - Map every request to exactly one `Route`
//! - Separate public routes (login, favicon) from session-gated ones
//! - Resolve proxy targets from the path, the `url` parameter, a bare
//!   domain or, as a last resort, the `Referer`
//!
//! # Design Decisions
//! - Immutable after construction (shared without locks)
//! - Local routes win over referer completion
//! - Explicit `NotFound` rather than a silent default

use axum::http::header::REFERER;
use axum::http::{HeaderMap, Uri};
use url::Url;

use crate::config::ServerConfig;
use crate::routing::matcher::{direct_target, domain_target, query_target, referer_target};

/// Directory an asset route reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetDir {
    Static,
    Templates,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Login,
    Favicon,
    Index,
    Chat,
    /// Relative path below the asset directory, still unchecked.
    Asset(AssetDir, String),
    Proxy(Url),
    NotFound,
}

impl Route {
    /// Routes reachable without a session.
    pub fn is_public(&self) -> bool {
        matches!(self, Route::Login | Route::Favicon)
    }

    /// Low-cardinality label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Route::Login => "login",
            Route::Favicon => "favicon",
            Route::Index => "index",
            Route::Chat => "chat",
            Route::Asset(AssetDir::Static, _) => "static",
            Route::Asset(AssetDir::Templates, _) => "templates",
            Route::Proxy(_) => "proxy",
            Route::NotFound => "not_found",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestRouter {
    login_path: String,
    favicon_path: String,
    origin: String,
}

impl RequestRouter {
    pub fn from_config(server: &ServerConfig) -> Self {
        Self {
            login_path: server.login_path.clone(),
            favicon_path: server.favicon_path.clone(),
            origin: server.origin.clone(),
        }
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    pub fn classify(&self, uri: &Uri, headers: &HeaderMap) -> Route {
        let path = uri.path();
        if path == self.login_path {
            return Route::Login;
        }
        if path == self.favicon_path {
            return Route::Favicon;
        }

        if let Some(target) = direct_target(uri)
            .or_else(|| query_target(uri))
            .or_else(|| domain_target(uri))
        {
            return Route::Proxy(target);
        }

        match path {
            "/" => return Route::Index,
            "/chat" => return Route::Chat,
            _ => {}
        }
        if let Some(rest) = path.strip_prefix("/static/") {
            return Route::Asset(AssetDir::Static, rest.to_string());
        }
        if let Some(rest) = path.strip_prefix("/templates/") {
            return Route::Asset(AssetDir::Templates, rest.to_string());
        }

        headers
            .get(REFERER)
            .and_then(|v| v.to_str().ok())
            .and_then(|referer| referer_target(uri, referer, &self.origin))
            .map_or(Route::NotFound, Route::Proxy)
    }
}
