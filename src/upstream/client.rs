//! Construction of upstream HTTP clients.

use std::error::Error as StdError;
use std::time::Duration;

use reqwest::redirect::Policy;
use reqwest::retry;

use crate::config::UpstreamConfig;

/// Extra sends a client makes on its own when a connection cannot be
/// established. The request never reached the origin, so replaying is safe.
pub const CONNECT_RETRIES: u32 = 2;

/// Settings applied to every client the pool builds.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub connect_timeout: Duration,
    pub idle_per_host: usize,
    pub connect_retries: u32,
}

impl ClientSettings {
    pub fn from_config(config: &UpstreamConfig) -> Self {
        Self {
            connect_timeout: config.timeout(),
            idle_per_host: 8,
            connect_retries: CONNECT_RETRIES,
        }
    }
}

/// Matches every host; retry scoping is by error kind, not destination.
struct AnyHost;

impl<'a> PartialEq<&'a str> for AnyHost {
    fn eq(&self, _: &&'a str) -> bool {
        true
    }
}

/// Whether `err` is a failure to connect, as opposed to one after sending.
pub fn is_connect_failure(err: &(dyn StdError + 'static)) -> bool {
    err.downcast_ref::<reqwest::Error>()
        .is_some_and(reqwest::Error::is_connect)
}

fn connect_retry_policy(retries: u32) -> retry::Builder {
    if retries == 0 {
        return retry::never();
    }
    retry::for_host(AnyHost)
        .max_retries_per_request(retries)
        .classify_fn(|req_rep| {
            if req_rep.error().is_some_and(is_connect_failure) {
                req_rep.retryable()
            } else {
                req_rep.success()
            }
        })
}

/// Build a client for talking to arbitrary origins.
///
/// Certificates are not verified and redirects are returned to the caller so
/// their `Location` can be rewritten. No overall deadline is set here: the
/// pipeline bounds each attempt up to the response head, and bodies may
/// stream for as long as the origin keeps sending.
pub fn build_client(settings: &ClientSettings) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .redirect(Policy::none())
        .connect_timeout(settings.connect_timeout)
        .pool_max_idle_per_host(settings.idle_per_host)
        .http1_only()
        .no_proxy()
        .retry(connect_retry_policy(settings.connect_retries))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(connect_retries: u32) -> ClientSettings {
        ClientSettings {
            connect_timeout: Duration::from_secs(2),
            idle_per_host: 1,
            connect_retries,
        }
    }

    #[test]
    fn default_settings_retry_connects_twice() {
        let settings = ClientSettings::from_config(&UpstreamConfig::default());
        assert_eq!(settings.connect_retries, 2);
        assert_eq!(settings.connect_timeout, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn refused_connection_is_a_connect_failure() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        for retries in [0, CONNECT_RETRIES] {
            let client = build_client(&settings(retries)).unwrap();
            let err = client
                .get(format!("http://{addr}/"))
                .send()
                .await
                .unwrap_err();
            assert!(is_connect_failure(&err), "{err:?}");
        }
    }

    #[tokio::test]
    async fn responses_are_not_replayed() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                    .await;
            }
        });

        let client = build_client(&settings(CONNECT_RETRIES)).unwrap();
        let response = client.get(format!("http://{addr}/")).send().await.unwrap();
        assert_eq!(response.status(), 503);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
