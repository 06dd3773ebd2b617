//! Upstream failure classification and retry.
//!
//! # Policy
//! - TLS handshake / unexpected-EOF failures: retried
//! - Timeouts: retried
//! - Anything else: surfaced immediately
//!
//! Attempts are capped at `max_attempts` in total, separated by a fixed
//! backoff. The method is not consulted: a transient failure means the origin
//! never produced a response, so the same request is re-sent as is.

use std::error::Error as StdError;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::config::UpstreamConfig;
use crate::observability::metrics;

/// Failure of a single upstream fetch, already classified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// TLS handshake failed or the peer closed the stream mid-exchange.
    #[error("TLS error: {0}")]
    TlsEof(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("request error: {0}")]
    Fatal(String),
}

impl FetchError {
    /// Classify a client error.
    pub fn classify(err: &reqwest::Error) -> Self {
        let text = error_chain_text(err);
        if err.is_timeout() {
            return FetchError::Timeout(text);
        }
        if is_tls_or_eof(err) {
            return FetchError::TlsEof(text);
        }
        FetchError::Fatal(text)
    }

    /// Whether another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::TlsEof(_) | FetchError::Timeout(_))
    }
}

/// Attempt ceiling and spacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &UpstreamConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: config.retry_backoff(),
        }
    }
}

/// Run `attempt` until it succeeds, fails non-transiently, or the attempt
/// ceiling is reached. `attempt` receives the 1-based attempt number.
pub async fn retry_transient<T, F, Fut>(policy: RetryPolicy, mut attempt: F) -> Result<T, FetchError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0;
    loop {
        attempts += 1;
        match attempt(attempts).await {
            Ok(value) => {
                metrics::record_upstream_attempt("success");
                return Ok(value);
            }
            Err(e) if e.is_transient() && attempts < max_attempts => {
                metrics::record_upstream_attempt("retry");
                tracing::warn!(
                    attempt = attempts,
                    max_attempts,
                    delay = ?policy.backoff,
                    error = %e,
                    "Transient upstream failure, retrying"
                );
                tokio::time::sleep(policy.backoff).await;
            }
            Err(FetchError::Timeout(_)) => {
                metrics::record_upstream_attempt("timeout");
                return Err(FetchError::Timeout(format!(
                    "no response after {attempts} attempts"
                )));
            }
            Err(e) => {
                metrics::record_upstream_attempt("failure");
                return Err(e);
            }
        }
    }
}

fn error_chain_text(err: &(dyn StdError + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !text.contains(&cause_text) {
            text.push_str(": ");
            text.push_str(&cause_text);
        }
        source = cause.source();
    }
    text
}

/// Walks the cause chain. The client's own top-level message embeds the
/// request URL, so only lower-level causes are matched by text.
fn is_tls_or_eof(err: &(dyn StdError + 'static)) -> bool {
    let mut source: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::UnexpectedEof {
                return true;
            }
        }
        if !cause.is::<reqwest::Error>() {
            let lower = cause.to_string().to_ascii_lowercase();
            if ["eof", "handshake", "tls", "ssl"]
                .iter()
                .any(|needle| lower.contains(needle))
            {
                return true;
            }
        }
        source = cause.source();
    }
    false
}
