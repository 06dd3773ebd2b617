//! TLS configuration and certificate loading.

use std::path::Path;

use axum_server::tls_rustls::{RustlsAcceptor, RustlsConfig};

use crate::config::TlsConfig;
use crate::net::listener::ListenerError;

/// Load the listener's certificate chain and key (PEM).
pub async fn load_tls_config(config: &TlsConfig) -> Result<RustlsConfig, ListenerError> {
    let cert_path = Path::new(&config.cert_path);
    let key_path = Path::new(&config.key_path);

    for (what, path) in [("Certificate", cert_path), ("Private key", key_path)] {
        if !path.exists() {
            return Err(ListenerError::Tls(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{what} file not found: {}", path.display()),
            )));
        }
    }

    let rustls = RustlsConfig::from_pem_file(cert_path, key_path)
        .await
        .map_err(ListenerError::Tls)?;
    tracing::info!(cert = %cert_path.display(), "TLS enabled");
    Ok(rustls)
}

/// Per-connection handshake driver for an accepted TCP stream.
pub fn acceptor(config: RustlsConfig) -> RustlsAcceptor {
    RustlsAcceptor::new(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_files_are_reported() {
        let config = TlsConfig {
            cert_path: "/nonexistent/cert.pem".into(),
            key_path: "/nonexistent/key.pem".into(),
        };
        let err = load_tls_config(&config).await.unwrap_err();
        assert!(err.to_string().contains("Certificate file not found"));
    }
}
