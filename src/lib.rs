//! SilkRoad: a session-gated, rewriting web proxy.

pub mod config;
pub mod http;
pub mod net;
pub mod routing;

pub mod cache;
pub mod proxy;
pub mod render;
pub mod rewrite;
pub mod session;
pub mod upstream;

pub mod admin;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::{Services, Shutdown};
