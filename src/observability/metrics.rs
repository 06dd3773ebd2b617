//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by route kind and status
//! - `proxy_request_duration_seconds` (histogram): latency distribution
//! - `proxy_upstream_attempts_total` (counter): upstream attempts by outcome
//! - `proxy_pool_acquire_total` (counter): client borrows by source
//! - `proxy_cache_events_total` (counter): cache hits, misses, stores, evictions
//! - `proxy_live_sessions` (gauge): sessions in the store
//!
//! Recording is a no-op until `init_metrics` installs the exporter.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(route: &'static str, method: &str, status: u16, start: Instant) {
    counter!(
        "proxy_requests_total",
        "route" => route,
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("proxy_request_duration_seconds", "route" => route)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_upstream_attempt(outcome: &'static str) {
    counter!("proxy_upstream_attempts_total", "outcome" => outcome).increment(1);
}

pub fn record_pool_acquire(source: &'static str) {
    counter!("proxy_pool_acquire_total", "source" => source).increment(1);
}

pub fn record_pool_discard(reason: &'static str) {
    counter!("proxy_pool_discard_total", "reason" => reason).increment(1);
}

pub fn record_cache_event(event: &'static str) {
    counter!("proxy_cache_events_total", "event" => event).increment(1);
}

pub fn record_cache_size(bytes: u64) {
    gauge!("proxy_cache_bytes").set(bytes as f64);
}

pub fn record_live_sessions(count: usize) {
    gauge!("proxy_live_sessions").set(count as f64);
}

pub fn record_maintenance_run(duty: &'static str, ok: bool) {
    counter!(
        "proxy_maintenance_runs_total",
        "duty" => duty,
        "result" => if ok { "ok" } else { "error" }
    )
    .increment(1);
}
