//! TCP listener implementation with backpressure.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Accept incoming TCP connections
//! - Bound concurrently served connections (the worker pool) via semaphore
//! - Graceful handling of accept errors

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::ListenerConfig;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("invalid bind address {address}: {source}")]
    Address {
        address: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("failed to bind: {0}")]
    Bind(#[source] std::io::Error),

    #[error("failed to accept: {0}")]
    Accept(#[source] std::io::Error),

    #[error("failed to load TLS material: {0}")]
    Tls(#[source] std::io::Error),

    #[error("connection limiter closed")]
    Closed,
}

/// A bounded TCP listener.
///
/// Uses a semaphore to enforce `max_connections`. When the limit is reached,
/// new connections wait in the kernel backlog until a slot frees up.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    connection_limit: Arc<Semaphore>,
    max_connections: usize,
}

impl Listener {
    /// Bind to the configured address with connection limits.
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let addr: SocketAddr = config
            .bind_address
            .parse()
            .map_err(|source| ListenerError::Address {
                address: config.bind_address.clone(),
                source,
            })?;

        let listener = TcpListener::bind(addr).await.map_err(ListenerError::Bind)?;
        Self::from_tcp(listener, config.max_connections)
    }

    /// Wrap an already bound listener.
    pub fn from_tcp(listener: TcpListener, max_connections: usize) -> Result<Self, ListenerError> {
        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;
        tracing::info!(
            address = %local_addr,
            max_connections,
            "Listener bound"
        );

        Ok(Self {
            inner: listener,
            connection_limit: Arc::new(Semaphore::new(max_connections)),
            max_connections,
        })
    }

    /// Accept a new connection, respecting the connection limit.
    ///
    /// Waits while the limit is reached. The returned permit must be held
    /// for the connection's lifetime.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        let permit = self
            .connection_limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Closed)?;

        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;

        tracing::debug!(
            peer_addr = %addr,
            available_permits = self.connection_limit.available_permits(),
            "Connection accepted"
        );

        Ok((stream, addr, ConnectionPermit { _permit: permit }))
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }

    /// Connection slots currently free.
    pub fn available_permits(&self) -> usize {
        self.connection_limit.available_permits()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

/// A connection slot. Dropping it frees the slot, even if the connection
/// task panicked.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: OwnedSemaphorePermit,
}
