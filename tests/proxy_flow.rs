//! End-to-end tests: session gate, rewriting, caching and error pages.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

mod common;

use common::{client, login, start_origin, start_proxy, start_proxy_with, MockResponse};

#[tokio::test]
async fn unauthenticated_requests_redirect_to_login() {
    let proxy = start_proxy().await;
    let client = client();

    let res = client.get(proxy.url("/some/protected/path")).send().await.unwrap();
    assert_eq!(res.status(), 302);
    assert_eq!(res.headers()["location"], "/login");

    let res = client.get(proxy.url("/https://example.com/")).send().await.unwrap();
    assert_eq!(res.status(), 302);

    let res = client.get(proxy.url("/login")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert!(res.text().await.unwrap().contains("<form"));

    // No favicon file in the test tree: served as not found, not redirected.
    let res = client.get(proxy.url("/favicon.ico")).send().await.unwrap();
    assert_eq!(res.status(), 404);
}

#[tokio::test]
async fn login_issues_a_session_cookie() {
    let proxy = start_proxy().await;
    let client = client();

    let res = client
        .post(proxy.url("/login"))
        .form(&[("user", common::USER), ("password", common::PASSWORD)])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 302);
    assert_eq!(res.headers()["location"], "/");
    let cookie = res.headers()["set-cookie"].to_str().unwrap().to_string();
    assert!(cookie.starts_with("silkroad_session="));
    assert!(cookie.contains("path=/"));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("expires="));

    let token = cookie.split(';').next().unwrap().trim_start_matches("silkroad_session=");
    assert_eq!(token.len(), 64);
    assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));

    let session = cookie.split(';').next().unwrap();
    let res = client
        .get(proxy.url("/"))
        .header("cookie", session)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
}

#[tokio::test]
async fn wrong_password_rerenders_login() {
    let proxy = start_proxy().await;
    let res = client()
        .post(proxy.url("/login"))
        .form(&[("user", common::USER), ("password", "wrong")])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert!(res.headers().get("set-cookie").is_none());
    assert!(res.text().await.unwrap().contains("data-failed=\"1\""));
}

#[tokio::test]
async fn every_response_carries_no_cache_headers_and_request_id() {
    let proxy = start_proxy().await;
    let res = client().get(proxy.url("/login")).send().await.unwrap();

    let headers = res.headers();
    assert_eq!(headers["cache-control"], "no-store, no-cache, must-revalidate, max-age=0");
    assert_eq!(headers["pragma"], "no-cache");
    assert_eq!(headers["expires"], "0");
    assert_eq!(headers["server"], "SilkRoad");
    assert!(headers.get("x-request-id").is_some());
}

#[tokio::test]
async fn proxied_html_is_rewritten() {
    let seen = Arc::new(Mutex::new(None));
    let seen_by_origin = seen.clone();
    let origin = start_origin(move |request| {
        let seen = seen_by_origin.clone();
        async move {
            *seen.lock().unwrap() = Some(request);
            MockResponse::new(
                200,
                "text/html; charset=utf-8",
                r#"<html><body><a href="/next">n</a><img src="https://cdn.example/i.png"></body></html>"#,
            )
        }
    })
    .await;

    let proxy = start_proxy().await;
    let client = client();
    let session = login(&client, &proxy).await;

    let res = client
        .get(proxy.proxied(origin, "/page?q=1"))
        .header("cookie", format!("{session}; theme=dark"))
        .header("x-forwarded-for", "10.1.2.3")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["access-control-allow-origin"], "*");
    assert_eq!(res.headers()["content-type"], "text/html; charset=utf-8");
    let length: usize = res.headers()["content-length"].to_str().unwrap().parse().unwrap();

    let body = res.text().await.unwrap();
    assert_eq!(body.len(), length);
    assert!(body.contains(&format!(r#"href="{}http://{origin}/next""#, proxy.origin())));
    assert!(body.contains(&format!(r#"src="{}https://cdn.example/i.png""#, proxy.origin())));

    let request = seen.lock().unwrap().clone().expect("origin was called");
    assert_eq!(request.path, "/page?q=1");
    assert_eq!(request.header("accept-encoding"), Some("identity"));
    assert_eq!(request.header("cookie"), Some("theme=dark"));
    assert!(request.header("x-forwarded-for").is_none());
}

#[tokio::test]
async fn cached_pages_skip_the_origin_but_are_rewritten_again() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let origin = start_origin(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { MockResponse::new(200, "text/html", r#"<a href="/x">x</a>"#) }
    })
    .await;

    let proxy = start_proxy().await;
    let client = client();
    let session = login(&client, &proxy).await;
    let url = proxy.proxied(origin, "/cached");

    let first = client.get(&url).header("cookie", &session).send().await.unwrap();
    let first = first.text().await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let second = client.get(&url).header("cookie", &session).send().await.unwrap();
    assert_eq!(second.status(), 200);
    assert_eq!(second.text().await.unwrap(), first);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(first.contains(&proxy.origin()));
}

#[tokio::test]
async fn large_binary_bodies_stream_intact() {
    let payload: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
    let served = payload.clone();
    let origin = start_origin(move |_| {
        let body = served.clone();
        async move { MockResponse::new(200, "application/octet-stream", body) }
    })
    .await;

    let proxy = start_proxy().await;
    let client = client();
    let session = login(&client, &proxy).await;

    let res = client
        .get(proxy.proxied(origin, "/blob.bin"))
        .header("cookie", &session)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert!(res.headers().get("content-length").is_none());
    assert_eq!(res.bytes().await.unwrap().as_ref(), payload.as_slice());
}

/// An HTML page well past a 4 KiB threshold, full of links that would be
/// rewritten if the page were buffered.
fn big_page() -> String {
    let mut page = String::from("<html><body>");
    for i in 0..400 {
        page.push_str(&format!(r#"<a href="/item/{i}">item {i}</a>"#));
    }
    page.push_str("</body></html>");
    page
}

async fn fetch_large_html(chunked: bool) {
    let page = big_page();
    let served = page.clone();
    let origin = start_origin(move |_| {
        let body = served.clone();
        async move {
            let response = MockResponse::new(200, "text/html", body);
            if chunked {
                response.chunked()
            } else {
                response
            }
        }
    })
    .await;

    let proxy = start_proxy_with(|config| {
        config.cache.large_file_threshold = 4096;
        config.cache.cache_large_files = false;
    })
    .await;
    let client = client();
    let session = login(&client, &proxy).await;

    let res = client
        .get(proxy.proxied(origin, "/big.html"))
        .header("cookie", &session)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert!(res.headers().get("content-length").is_none());
    assert_eq!(res.bytes().await.unwrap().as_ref(), page.as_bytes());

    tokio::time::sleep(Duration::from_millis(200)).await;
    let url = format!("http://{origin}/big.html");
    assert!(proxy.services.cache.lookup(&url).is_none());
}

#[tokio::test]
async fn large_html_with_declared_length_streams_unrewritten() {
    fetch_large_html(false).await;
}

#[tokio::test]
async fn chunked_html_past_threshold_replays_buffered_prefix() {
    fetch_large_html(true).await;
}

#[tokio::test]
async fn redirects_and_cookies_point_back_through_the_proxy() {
    let origin = start_origin(|_| async {
        MockResponse::new(302, "text/plain", "")
            .header("Location", "/landing")
            .header("Set-Cookie", "sid=abc; Path=/; Domain=origin.example; Secure")
            .header("Set-Cookie", "pref=1; Expires=Wed, 21 Oct 2015 07:28:00 GMT")
    })
    .await;

    let proxy = start_proxy().await;
    let client = client();
    let session = login(&client, &proxy).await;

    let res = client
        .get(proxy.proxied(origin, "/start"))
        .header("cookie", &session)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 302);
    assert_eq!(
        res.headers()["location"],
        format!("{}http://{origin}/landing", proxy.origin()).as_str()
    );

    let cookies: Vec<String> = res
        .headers()
        .get_all("set-cookie")
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    assert_eq!(cookies.len(), 2);

    let sid = cookies.iter().find(|c| c.starts_with("sid=abc")).unwrap();
    assert!(sid.contains("Domain=.127.0.0.1"));
    assert!(sid.contains(&format!("Path=/http://{origin}/")));
    assert!(!sid.contains("Secure"));
    assert!(sid.contains("Expires="));

    let pref = cookies.iter().find(|c| c.starts_with("pref=1")).unwrap();
    assert!(!pref.contains("2015"));
}

#[tokio::test]
async fn non_html_not_found_gets_the_local_page() {
    let origin = start_origin(|_| async { MockResponse::new(404, "application/json", "{}") }).await;
    let proxy = start_proxy().await;
    let client = client();
    let session = login(&client, &proxy).await;

    let res = client
        .get(proxy.proxied(origin, "/missing.json"))
        .header("cookie", &session)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);
    assert!(res.headers()["content-type"].to_str().unwrap().starts_with("text/html"));
    assert!(res.text().await.unwrap().contains("404"));
}

#[tokio::test]
async fn websocket_upgrades_are_not_implemented() {
    let proxy = start_proxy().await;
    let client = client();
    let session = login(&client, &proxy).await;

    let res = client
        .get(proxy.url("/https://example.com/socket"))
        .header("cookie", &session)
        .header("connection", "upgrade")
        .header("upgrade", "websocket")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 501);
}

#[tokio::test]
async fn unreachable_origin_is_a_client_error() {
    let proxy = start_proxy_with(|config| {
        config.upstream.max_attempts = 1;
    })
    .await;
    let client = client();
    let session = login(&client, &proxy).await;

    // Port 9 (discard) is closed on test hosts; the connect is refused.
    let res = client
        .get(proxy.url("/http://127.0.0.1:9/"))
        .header("cookie", &session)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
}

#[tokio::test]
async fn asset_traversal_is_forbidden() {
    let proxy = start_proxy().await;
    let client = client();
    let session = login(&client, &proxy).await;

    let res = client
        .get(proxy.url("/static/a/..%2F..%2Fusers.json"))
        .header("cookie", &session)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 403);

    let res = client
        .get(proxy.url("/static/missing.css"))
        .header("cookie", &session)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);
}

#[tokio::test]
async fn query_parameter_selects_target() {
    let origin = start_origin(|request| async move {
        MockResponse::new(200, "text/plain", format!("path={}", request.path))
    })
    .await;
    let proxy = start_proxy().await;
    let client = client();
    let session = login(&client, &proxy).await;

    let res = client
        .get(proxy.url("/"))
        .query(&[("url", format!("http://{origin}/via-query"))])
        .header("cookie", &session)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "path=/via-query");
}

#[tokio::test]
async fn slow_origins_are_retried_then_reported() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let origin = start_origin(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            MockResponse::new(200, "text/plain", "late")
        }
    })
    .await;

    let proxy = start_proxy_with(|config| {
        config.upstream.timeout_secs = 1;
        config.upstream.max_attempts = 2;
    })
    .await;
    let client = client();
    let session = login(&client, &proxy).await;

    let res = client
        .get(proxy.proxied(origin, "/slow"))
        .header("cookie", &session)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
    assert!(res.text().await.unwrap().contains("timed out"));
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}
