//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, worker pool, TLS).
    pub listener: ListenerConfig,

    /// Identity of the proxy as seen by clients, plus local pages.
    pub server: ServerConfig,

    /// Session store settings.
    pub sessions: SessionConfig,

    /// Response cache settings.
    pub cache: CacheConfig,

    /// Upstream client pool and fetch settings.
    pub upstream: UpstreamConfig,

    /// Inbound request limits.
    pub limits: LimitsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,

    /// Script injection into rewritten pages.
    pub inject: InjectConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,

    /// Worker pool capacity: maximum concurrently served connections.
    /// Further connections queue until a worker frees up.
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
            max_connections: 200,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// How the proxy presents itself and where local pages live.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// External origin prefix, with trailing slash (e.g. "https://proxy.example/").
    /// Rewritten links are `<origin><absolute upstream url>`.
    pub origin: String,

    /// Domain used when rewriting upstream `Domain=` cookie attributes.
    pub domain: String,

    /// External scheme of the proxy ("http" or "https").
    pub scheme: String,

    /// Value of the `Server` response header.
    pub server_name: String,

    pub login_path: String,
    pub favicon_path: String,
    pub session_cookie_name: String,

    /// Directory served under `/static/`.
    pub static_dir: PathBuf,
    /// Directory served under `/templates/`.
    pub templates_dir: PathBuf,

    pub index_file: PathBuf,
    pub login_file: PathBuf,
    pub chat_file: PathBuf,
    pub not_found_file: PathBuf,
    pub favicon_file: PathBuf,

    /// JSON object mapping user names to passwords.
    pub credentials_file: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:8080/".to_string(),
            domain: "localhost".to_string(),
            scheme: "http".to_string(),
            server_name: "SilkRoad".to_string(),
            login_path: "/login".to_string(),
            favicon_path: "/favicon.ico".to_string(),
            session_cookie_name: "silkroad_session".to_string(),
            static_dir: PathBuf::from("static"),
            templates_dir: PathBuf::from("templates"),
            index_file: PathBuf::from("templates/index.html"),
            login_file: PathBuf::from("templates/login.html"),
            chat_file: PathBuf::from("templates/chat.html"),
            not_found_file: PathBuf::from("templates/404.html"),
            favicon_file: PathBuf::from("static/favicon.ico"),
            credentials_file: PathBuf::from("databases/users.json"),
        }
    }
}

impl ServerConfig {
    /// True when the proxy is reached over plain HTTP.
    pub fn is_plain_http(&self) -> bool {
        self.scheme.eq_ignore_ascii_case("http")
    }
}

/// Session store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Number of alphanumeric characters per token.
    pub token_length: usize,

    /// A session stays live while `now - last_seen <= max_age_secs`.
    pub max_age_secs: u64,

    /// Interval of the recycle sweep.
    pub recycle_interval_secs: u64,

    /// Lifetime of a fast-index entry, independent of the session itself.
    pub index_ttl_secs: u64,

    /// Minimum spacing between `last_seen` refreshes of a single session.
    pub refresh_interval_secs: u64,

    /// Optional JSON file sessions are persisted to.
    pub persistence_path: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            token_length: 64,
            max_age_secs: 7 * 24 * 60 * 60,
            recycle_interval_secs: 60 * 60,
            index_ttl_secs: 5 * 60,
            refresh_interval_secs: 5 * 60,
            persistence_path: None,
        }
    }
}

impl SessionConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    pub fn index_ttl(&self) -> Duration {
        Duration::from_secs(self.index_ttl_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache root directory.
    pub dir: PathBuf,

    /// Global switch; lookups and stores are skipped when false.
    pub enabled: bool,

    pub cache_html: bool,
    pub cache_media: bool,
    pub cache_other: bool,

    /// Allow storing bodies above `large_file_threshold`.
    pub cache_large_files: bool,

    /// Bodies larger than this are "large" (also the streaming threshold for HTML).
    pub large_file_threshold: u64,

    /// Aggregate size budget enforced by the sweep.
    pub max_size_bytes: u64,

    /// Entries older than this are treated as absent.
    pub max_age_secs: u64,

    pub sweep_interval_secs: u64,

    /// Wipe the cache tree at startup.
    pub clear_on_start: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("temp"),
            enabled: true,
            cache_html: true,
            cache_media: true,
            cache_other: true,
            cache_large_files: false,
            large_file_threshold: 1024 * 1024,
            max_size_bytes: 500 * 1024 * 1024,
            max_age_secs: 24 * 60 * 60,
            sweep_interval_secs: 60 * 60,
            clear_on_start: true,
        }
    }
}

impl CacheConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

/// Upstream client pool and fetch configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Maximum number of pooled clients.
    pub pool_capacity: usize,

    /// How long a borrower waits for a released client before getting an
    /// uncounted one.
    pub acquire_wait_ms: u64,

    /// Per-attempt timeout in seconds.
    pub timeout_secs: u64,

    /// Total attempts for transient failures (1 = no retry).
    pub max_attempts: u32,

    /// Fixed delay between attempts in milliseconds.
    pub retry_backoff_ms: u64,

    /// Replace the client's User-Agent with one from a fixed pool.
    pub randomize_user_agent: bool,

    /// Sent when the client supplies no Accept-Language.
    pub default_accept_language: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            pool_capacity: 64,
            acquire_wait_ms: 1000,
            timeout_secs: 30,
            max_attempts: 3,
            retry_backoff_ms: 1000,
            randomize_user_agent: true,
            default_accept_language: "zh-CN,cn;q=0.9".to_string(),
        }
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn acquire_wait(&self) -> Duration {
        Duration::from_millis(self.acquire_wait_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Upper bound on time spent producing an upstream response:
    /// every attempt timing out plus the backoff between them.
    pub fn worst_case_latency(&self) -> Duration {
        let attempts = self.max_attempts.max(1);
        self.timeout() * attempts + self.retry_backoff() * (attempts - 1)
    }
}

/// Inbound request limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum request body forwarded upstream.
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON lines instead of human-readable output.
    pub json_logs: bool,

    /// Optional log file, rotated daily.
    pub log_file: Option<PathBuf>,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            log_file: None,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Script injection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InjectConfig {
    pub enabled: bool,

    /// Directory whose `.js` files are appended to rewritten HTML.
    pub scripts_dir: PathBuf,
}

impl Default for InjectConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            scripts_dir: PathBuf::from("scripts"),
        }
    }
}
