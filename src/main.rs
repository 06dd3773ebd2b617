//! SilkRoad proxy server.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ net::Listener ──▶ http (request ID, trace, no-cache headers)
//!                 (worker pool)          │
//!                                        ▼
//!                                 routing::RequestRouter ──▶ login / pages / assets
//!                                        │ session gate
//!                                        ▼
//!                                 proxy::ProxyPipeline
//!                                   │ cache lookup ─────▶ cache::ResponseCache
//!                                   │ fetch + retry ────▶ upstream::ClientPool ──▶ Origin
//!                                   ▼
//!                                 rewrite (links, Location, Set-Cookie, charset)
//!                                 render  (script injection, not-found page)
//!
//!     lifecycle: startup, maintenance (session recycle, cache sweep), shutdown
//!     admin:     bearer-key API on a separate listener
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use silkroad_proxy::admin::{serve_admin, AdminState};
use silkroad_proxy::config::validation::validate_config;
use silkroad_proxy::config::{load_config, ConfigError, ProxyConfig};
use silkroad_proxy::lifecycle::maintenance::{spawn_cache_sweeper, spawn_session_recycler};
use silkroad_proxy::lifecycle::signals::spawn_signal_handler;
use silkroad_proxy::lifecycle::{Services, Shutdown};
use silkroad_proxy::net::tls::load_tls_config;
use silkroad_proxy::net::Listener;
use silkroad_proxy::observability::{logging, metrics};
use silkroad_proxy::HttpServer;

/// How long open connections may keep running after shutdown begins.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(30);

#[derive(Debug, Parser)]
#[command(name = "silkroad-proxy", version, about = "Session-gated rewriting web proxy")]
struct Args {
    /// TOML configuration file; built-in defaults when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }
    validate_config(&config).map_err(ConfigError::Validation)?;

    let _log_guard = logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "silkroad-proxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        origin = %config.server.origin,
        cache_enabled = config.cache.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let services = Services::build(&config)?;
    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    let mut background = vec![spawn_session_recycler(
        services.sessions.clone(),
        Duration::from_secs(config.sessions.recycle_interval_secs),
        shutdown.subscribe(),
    )];
    if config.cache.enabled {
        background.push(spawn_cache_sweeper(
            services.cache.clone(),
            Duration::from_secs(config.cache.sweep_interval_secs),
            shutdown.subscribe(),
        ));
    }

    if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        let state = AdminState::new(&config.admin, services.clone());
        let admin_shutdown = shutdown.subscribe();
        background.push(tokio::spawn(async move {
            if let Err(e) = serve_admin(listener, state, admin_shutdown).await {
                tracing::error!(error = %e, "Admin API failed");
            }
        }));
    }

    let listener = Listener::bind(&config.listener).await?;
    let mut server = HttpServer::new(&config, services.app_state(&config));
    if let Some(tls) = &config.listener.tls {
        server = server.with_tls(load_tls_config(tls).await?);
    }
    let connections = server.connections();

    server.run(listener, shutdown.subscribe()).await?;
    shutdown.trigger();

    if !connections.drain(SHUTDOWN_DRAIN).await {
        tracing::warn!(
            open_connections = connections.active_count(),
            "Drain deadline passed; exiting with connections open"
        );
    }
    for task in background {
        let _ = task.await;
    }
    if let Err(e) = services.sessions.save() {
        tracing::error!(error = %e, "Failed to persist sessions");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
