//! Request dispatch.
//!
//! Every request lands in [`dispatch`], which classifies it, applies the
//! session gate and hands it to the matching local handler or the proxy
//! pipeline.

use std::path::Path;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;

use crate::http::response::{asset_content_type, found, login_success, session_cookie};
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::render::html_response;
use crate::routing::matcher::is_safe_asset_path;
use crate::routing::{AssetDir, Route};

/// Login forms are tiny; anything larger is not a login attempt.
const MAX_LOGIN_FORM_BYTES: usize = 16 * 1024;

pub async fn dispatch(State(state): State<AppState>, request: Request) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let route = state.router.classify(request.uri(), request.headers());
    let kind = route.kind();

    let response = if !route.is_public() && !state.is_authenticated(request.headers()) {
        tracing::debug!(route = kind, "No session; redirecting to login");
        found(state.login_location.clone())
    } else {
        match route {
            Route::Login => login(&state, request).await,
            Route::Favicon => favicon(&state),
            Route::Index => html_response(StatusCode::OK, state.pages.index()),
            Route::Chat => html_response(StatusCode::OK, state.pages.chat()),
            Route::Asset(dir, relative) => asset(&state, dir, &relative).await,
            Route::Proxy(target) => {
                tracing::info!(method = %method, url = %target, "Proxying");
                state.pipeline.handle(target, request).await
            }
            Route::NotFound => not_found(&state),
        }
    };

    metrics::record_request(kind, method.as_str(), response.status().as_u16(), start);
    response
}

async fn login(state: &AppState, request: Request) -> Response {
    match *request.method() {
        Method::GET | Method::HEAD => html_response(StatusCode::OK, state.pages.login(false)),
        Method::POST => {
            let form = match axum::body::to_bytes(request.into_body(), MAX_LOGIN_FORM_BYTES).await {
                Ok(form) => form,
                Err(e) => {
                    tracing::debug!(error = %e, "Unreadable login form");
                    return html_response(StatusCode::OK, state.pages.login(true));
                }
            };

            let mut user = None;
            let mut password = None;
            for (key, value) in url::form_urlencoded::parse(&form) {
                match key.as_ref() {
                    "user" => user = Some(value.into_owned()),
                    "password" => password = Some(value.into_owned()),
                    _ => {}
                }
            }

            match (user, password) {
                (Some(user), Some(password)) if state.credentials.verify(&user, &password) => {
                    let token = state.sessions.create_session();
                    tracing::info!(user = %user, "Login succeeded");
                    login_success(&session_cookie(&state.server.session_cookie_name, &token, Utc::now()))
                }
                (user, _) => {
                    tracing::info!(user = user.as_deref().unwrap_or(""), "Login failed");
                    html_response(StatusCode::OK, state.pages.login(true))
                }
            }
        }
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

fn favicon(state: &AppState) -> Response {
    let icon = state.pages.favicon();
    if icon.is_empty() {
        return not_found(state);
    }
    (
        [(CONTENT_TYPE, HeaderValue::from_static("image/x-icon"))],
        Body::from(icon),
    )
        .into_response()
}

async fn asset(state: &AppState, dir: AssetDir, relative: &str) -> Response {
    if !is_safe_asset_path(relative) {
        tracing::warn!(path = relative, "Rejected asset path");
        return (StatusCode::FORBIDDEN, "Forbidden").into_response();
    }

    let root: &Path = match dir {
        AssetDir::Static => &state.server.static_dir,
        AssetDir::Templates => &state.server.templates_dir,
    };
    let path = root.join(relative);

    match tokio::fs::read(&path).await {
        Ok(bytes) => (
            [(CONTENT_TYPE, HeaderValue::from_static(asset_content_type(&path)))],
            Body::from(bytes),
        )
            .into_response(),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Asset not found");
            not_found(state)
        }
    }
}

fn not_found(state: &AppState) -> Response {
    html_response(StatusCode::NOT_FOUND, state.pages.not_found())
}
