//! Shared utilities for integration tests: a raw-TCP mock origin and a
//! running proxy bound to an ephemeral port.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use silkroad_proxy::config::ProxyConfig;
use silkroad_proxy::lifecycle::{Services, Shutdown};
use silkroad_proxy::net::Listener;
use silkroad_proxy::HttpServer;

pub const USER: &str = "alice";
pub const PASSWORD: &str = "s3cret";

/// What the mock origin saw.
#[derive(Debug, Clone)]
pub struct MockRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
}

impl MockRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// What the mock origin answers.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Send the body with chunked framing instead of `Content-Length`.
    pub chunked: bool,
}

impl MockResponse {
    pub fn new(status: u16, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".into(), content_type.into())],
            body: body.into(),
            chunked: false,
        }
    }

    pub fn chunked(mut self) -> Self {
        self.chunked = true;
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Start a programmable origin on an ephemeral port.
pub async fn start_origin<F, Fut>(handler: F) -> SocketAddr
where
    F: Fn(MockRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MockResponse> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handler = Arc::new(handler);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    let handler = handler.clone();
                    tokio::spawn(async move {
                        let _ = serve_one(socket, handler.as_ref()).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

async fn serve_one<F, Fut>(mut socket: TcpStream, handler: &F) -> std::io::Result<()>
where
    F: Fn(MockRequest) -> Fut,
    Fut: Future<Output = MockResponse>,
{
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next().unwrap_or_default().split(' ');
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or_default().to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    let request = MockRequest { method, path, headers };
    let body_len: usize = request
        .header("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let mut have = buf.len() - (head_end + 4);
    while have < body_len {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        have += n;
    }

    let response = handler(request).await;
    let mut out = format!("HTTP/1.1 {} {}\r\n", response.status, reason(response.status));
    for (name, value) in &response.headers {
        out.push_str(&format!("{name}: {value}\r\n"));
    }
    if response.chunked {
        out.push_str("Transfer-Encoding: chunked\r\nConnection: close\r\n\r\n");
    } else {
        out.push_str(&format!(
            "Content-Length: {}\r\nConnection: close\r\n\r\n",
            response.body.len()
        ));
    }

    socket.write_all(out.as_bytes()).await?;
    if response.chunked {
        for piece in response.body.chunks(1000) {
            socket.write_all(format!("{:x}\r\n", piece.len()).as_bytes()).await?;
            socket.write_all(piece).await?;
            socket.write_all(b"\r\n").await?;
            socket.flush().await?;
        }
        socket.write_all(b"0\r\n\r\n").await?;
    } else {
        socket.write_all(&response.body).await?;
    }
    socket.shutdown().await?;
    tokio::time::sleep(Duration::from_millis(10)).await;
    Ok(())
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        301 => "Moved Permanently",
        302 => "Found",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// A proxy running in-process.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub services: Services,
    pub shutdown: Shutdown,
    _dir: TempDir,
}

impl TestProxy {
    /// Base URL with trailing slash, e.g. `http://127.0.0.1:4000/`.
    pub fn origin(&self) -> String {
        format!("http://{}/", self.addr)
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// `/http://<origin>/<path>`
    pub fn proxied(&self, upstream: SocketAddr, path: &str) -> String {
        format!("http://{}/http://{}{}", self.addr, upstream, path)
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub async fn start_proxy() -> TestProxy {
    start_proxy_with(|_| {}).await
}

/// Start a proxy; `tweak` adjusts the configuration before services start.
pub async fn start_proxy_with(tweak: impl FnOnce(&mut ProxyConfig)) -> TestProxy {
    let dir = TempDir::new().unwrap();
    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = tcp.local_addr().unwrap();

    let users = dir.path().join("users.json");
    std::fs::write(&users, format!(r#"{{"{USER}": "{PASSWORD}"}}"#)).unwrap();

    let mut config = ProxyConfig::default();
    config.server.origin = format!("http://{addr}/");
    config.server.domain = "127.0.0.1".into();
    config.server.credentials_file = users;
    config.server.static_dir = dir.path().join("static");
    config.server.templates_dir = dir.path().join("templates");
    config.server.index_file = dir.path().join("templates").join("index.html");
    config.server.login_file = dir.path().join("templates").join("login.html");
    config.server.chat_file = dir.path().join("templates").join("chat.html");
    config.server.not_found_file = dir.path().join("templates").join("404.html");
    config.server.favicon_file = dir.path().join("static").join("favicon.ico");
    config.cache.dir = dir.path().join("cache");
    config.upstream.retry_backoff_ms = 50;
    config.upstream.timeout_secs = 5;
    tweak(&mut config);

    let services = Services::build(&config).unwrap();
    let shutdown = Shutdown::new();
    let server = HttpServer::new(&config, services.app_state(&config));
    let listener = Listener::from_tcp(tcp, config.listener.max_connections).unwrap();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    TestProxy {
        addr,
        services,
        shutdown,
        _dir: dir,
    }
}

/// Client that neither follows redirects nor uses a system proxy.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .build()
        .unwrap()
}

/// Log in and return the `Cookie` header value carrying the session.
pub async fn login(client: &reqwest::Client, proxy: &TestProxy) -> String {
    let res = client
        .post(proxy.url("/login"))
        .form(&[("user", USER), ("password", PASSWORD)])
        .send()
        .await
        .expect("proxy unreachable");
    assert_eq!(res.status(), 302, "login should redirect");

    let set_cookie = res
        .headers()
        .get("set-cookie")
        .expect("session cookie")
        .to_str()
        .unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}
