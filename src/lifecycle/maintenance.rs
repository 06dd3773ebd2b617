//! Periodic background duties: session recycling and cache sweeping.
//!
//! Each duty is its own task driven by a `tokio::time::interval`. Every
//! tick runs on the blocking pool in a fresh task, so a failing or panicking
//! run is logged and the schedule carries on. The shutdown broadcast ends
//! the loop.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::cache::ResponseCache;
use crate::observability::metrics;
use crate::session::{SessionError, SessionStore};

/// Run `job` every `every` until shutdown. The first run happens one period
/// after the call.
pub fn spawn_periodic<F, E>(
    duty: &'static str,
    every: Duration,
    mut shutdown: broadcast::Receiver<()>,
    job: F,
) -> JoinHandle<()>
where
    F: Fn() -> Result<(), E> + Send + Sync + 'static,
    E: Display + Send + 'static,
{
    let job = Arc::new(job);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::debug!(duty, "Maintenance task stopping");
                    break;
                }
                _ = ticker.tick() => {
                    let job = Arc::clone(&job);
                    let ok = match tokio::task::spawn_blocking(move || job()).await {
                        Ok(Ok(())) => true,
                        Ok(Err(e)) => {
                            tracing::warn!(duty, error = %e, "Maintenance run failed");
                            false
                        }
                        Err(e) => {
                            tracing::error!(duty, error = %e, "Maintenance run panicked");
                            false
                        }
                    };
                    metrics::record_maintenance_run(duty, ok);
                }
            }
        }
    })
}

/// Expire sessions and persist the survivors.
pub fn spawn_session_recycler(
    sessions: Arc<SessionStore>,
    every: Duration,
    shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    spawn_periodic("session_recycle", every, shutdown, move || -> Result<(), SessionError> {
        let stats = sessions.recycle();
        tracing::info!(
            expired = stats.expired_sessions,
            stale_index = stats.stale_index_entries,
            live = stats.live_sessions,
            "Recycled sessions"
        );
        sessions.save()
    })
}

/// Expire and evict cache entries.
pub fn spawn_cache_sweeper(
    cache: Arc<ResponseCache>,
    every: Duration,
    shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    spawn_periodic("cache_sweep", every, shutdown, move || -> Result<(), std::convert::Infallible> {
        let stats = cache.sweep();
        tracing::info!(
            scanned = stats.scanned,
            expired = stats.expired,
            evicted = stats.evicted,
            remaining_bytes = stats.remaining_bytes,
            "Swept cache"
        );
        Ok(())
    })
}
