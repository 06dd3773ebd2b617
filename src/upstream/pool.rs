//! Bounded pool of reusable upstream clients.
//!
//! # Responsibilities
//! - Hand out idle clients, creating new ones lazily up to capacity
//! - Wait briefly for a release when exhausted, then fall back to an
//!   uncounted client so a borrower is never refused
//! - Take clients back through the borrow guard's `Drop`, whichever way
//!   the borrower exits

use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Notify;

use crate::config::UpstreamConfig;
use crate::observability::metrics;
use crate::upstream::client::{build_client, ClientSettings};

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub idle: usize,
    pub created: usize,
    pub capacity: usize,
}

/// Pool of reusable upstream clients.
#[derive(Debug)]
pub struct ClientPool {
    idle: Mutex<VecDeque<reqwest::Client>>,
    /// Clients counted against capacity, idle or borrowed.
    created: AtomicUsize,
    capacity: usize,
    released: Notify,
    acquire_wait: Duration,
    settings: ClientSettings,
}

impl ClientPool {
    pub fn new(config: &UpstreamConfig) -> Arc<Self> {
        Self::with_settings(
            config.pool_capacity,
            config.acquire_wait(),
            ClientSettings::from_config(config),
        )
    }

    pub fn with_settings(
        capacity: usize,
        acquire_wait: Duration,
        settings: ClientSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            idle: Mutex::new(VecDeque::with_capacity(capacity)),
            created: AtomicUsize::new(0),
            capacity,
            released: Notify::new(),
            acquire_wait,
            settings,
        })
    }

    /// Borrow a client.
    pub async fn acquire(self: &Arc<Self>) -> reqwest::Result<PooledClient> {
        if let Some(client) = self.try_acquire()? {
            return Ok(client);
        }

        let deadline = tokio::time::Instant::now() + self.acquire_wait;
        while tokio::time::timeout_at(deadline, self.released.notified())
            .await
            .is_ok()
        {
            if let Some(client) = self.try_acquire()? {
                return Ok(client);
            }
        }

        tracing::warn!(
            capacity = self.capacity,
            waited = ?self.acquire_wait,
            "Client pool exhausted, using an uncounted client"
        );
        metrics::record_pool_acquire("overflow");
        Ok(PooledClient {
            client: Some(build_client(&self.settings)?),
            pool: self.clone(),
            counted: false,
            usable: true,
        })
    }

    /// Non-blocking half of `acquire`: an idle client, or a freshly built one
    /// if capacity allows.
    fn try_acquire(self: &Arc<Self>) -> reqwest::Result<Option<PooledClient>> {
        if let Some(client) = self.pop_idle() {
            metrics::record_pool_acquire("idle");
            return Ok(Some(self.counted(client)));
        }
        if self.try_reserve_slot() {
            match build_client(&self.settings) {
                Ok(client) => {
                    metrics::record_pool_acquire("new");
                    tracing::debug!(
                        created = self.created.load(Ordering::Relaxed),
                        capacity = self.capacity,
                        "Created pooled client"
                    );
                    return Ok(Some(self.counted(client)));
                }
                Err(e) => {
                    self.created.fetch_sub(1, Ordering::AcqRel);
                    return Err(e);
                }
            }
        }
        Ok(None)
    }

    fn counted(self: &Arc<Self>, client: reqwest::Client) -> PooledClient {
        PooledClient {
            client: Some(client),
            pool: self.clone(),
            counted: true,
            usable: true,
        }
    }

    fn pop_idle(&self) -> Option<reqwest::Client> {
        self.idle.lock().expect("client pool mutex poisoned").pop_front()
    }

    /// Claim one unit of capacity without ever exceeding it.
    fn try_reserve_slot(&self) -> bool {
        let mut prev = self.created.load(Ordering::Acquire);
        loop {
            if prev >= self.capacity {
                return false;
            }
            match self.created.compare_exchange_weak(
                prev,
                prev + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => prev = actual,
            }
        }
    }

    fn release(&self, client: reqwest::Client, usable: bool) {
        if !usable {
            drop(client);
            self.created.fetch_sub(1, Ordering::AcqRel);
            metrics::record_pool_discard("unusable");
            tracing::debug!("Discarded unusable pooled client");
            self.released.notify_one();
            return;
        }

        let mut idle = self.idle.lock().expect("client pool mutex poisoned");
        if idle.len() >= self.capacity {
            drop(idle);
            drop(client);
            self.created.fetch_sub(1, Ordering::AcqRel);
            metrics::record_pool_discard("queue_full");
        } else {
            idle.push_back(client);
            drop(idle);
        }
        self.released.notify_one();
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            idle: self.idle.lock().expect("client pool mutex poisoned").len(),
            created: self.created.load(Ordering::Acquire),
            capacity: self.capacity,
        }
    }
}

/// A borrowed client. Dropping it returns the client to the pool.
#[derive(Debug)]
pub struct PooledClient {
    client: Option<reqwest::Client>,
    pool: Arc<ClientPool>,
    counted: bool,
    usable: bool,
}

impl PooledClient {
    /// Whether this client counts against pool capacity.
    pub fn is_pooled(&self) -> bool {
        self.counted
    }

    /// Retire the client instead of returning it to the idle queue.
    pub fn mark_unusable(&mut self) {
        self.usable = false;
    }
}

impl Deref for PooledClient {
    type Target = reqwest::Client;

    fn deref(&self) -> &Self::Target {
        self.client
            .as_ref()
            .expect("pooled client accessed after release")
    }
}

impl Drop for PooledClient {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            if self.counted {
                self.pool.release(client, self.usable);
            }
        }
    }
}
