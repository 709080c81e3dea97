//! End-to-end tests: a real gateway listener in front of raw-socket backends.

use std::time::Duration;

use axum::http::StatusCode;

mod common;

use common::{client, config, start_backend, start_fixed_backend, start_gateway, Reply};

#[tokio::test]
async fn test_strip_prefix_and_forwarded_headers() {
    let (backend, seen) = start_fixed_backend("hello").await;
    let (gateway, _shutdown) = start_gateway(config(
        r#"
        [forwarded]
        trusted_proxies = "127\\.0\\.0\\.1"

        [[routes]]
        id = "prefixed"
        uri = "http://{backend}"

        [[routes.predicates]]
        name = "Path"
        args = { pattern = "/prefix/**" }

        [[routes.filters]]
        name = "StripPrefix"
        args = { parts = 1 }
        "#,
        backend,
    ))
    .await;

    let res = client()
        .get(format!("http://{}/prefix/get?x=1", gateway))
        .header("X-Forwarded-For", "127.0.0.1, 203.0.113.9")
        .send()
        .await
        .expect("gateway unreachable");
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().contains_key("x-request-id"));
    assert_eq!(res.text().await.unwrap(), "hello");

    let seen = seen.lock().unwrap();
    let request = &seen[0];
    assert_eq!(request.path, "/get?x=1");
    assert_eq!(request.header("x-forwarded-prefix"), ["/prefix"]);
    assert_eq!(request.header("x-forwarded-proto"), ["http"]);
    assert_eq!(request.header("x-forwarded-port"), [gateway.port().to_string().as_str()]);
    assert_eq!(request.header("x-forwarded-host"), [gateway.to_string().as_str()]);
    // The untrusted 203.0.113.9 entry is dropped, the peer appended.
    assert_eq!(request.header("x-forwarded-for"), ["127.0.0.1,127.0.0.1"]);

    let forwarded = request.header("forwarded");
    assert_eq!(forwarded.len(), 1);
    assert!(
        forwarded[0].starts_with(&format!("host={};proto=http;for=\"127.0.0.1:", gateway)),
        "unexpected Forwarded: {}",
        forwarded[0]
    );
}

#[tokio::test]
async fn test_x_forwarded_for_appends_peer() {
    let (backend, seen) = start_fixed_backend("ok").await;
    let (gateway, _shutdown) = start_gateway(config(
        r#"
        [forwarded]
        trusted_proxies = ".*"

        [[routes]]
        id = "all"
        uri = "http://{backend}"
        "#,
        backend,
    ))
    .await;

    let res = client()
        .get(format!("http://{}/get", gateway))
        .header("X-Forwarded-For", "192.168.0.2")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let seen = seen.lock().unwrap();
    assert_eq!(seen[0].header("x-forwarded-for"), ["192.168.0.2,127.0.0.1"]);
    assert!(seen[0].header("x-forwarded-prefix").is_empty());
}

#[tokio::test]
async fn test_untrusted_gateway_adds_no_forwarding_headers() {
    let (backend, seen) = start_fixed_backend("ok").await;
    let (gateway, _shutdown) = start_gateway(config(
        r#"
        [forwarded]
        trusted_proxies = "10\\.0\\.0\\..*"

        [[routes]]
        id = "all"
        uri = "http://{backend}"
        "#,
        backend,
    ))
    .await;

    let res = client().get(format!("http://{}/", gateway)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let seen = seen.lock().unwrap();
    assert!(seen[0].header("forwarded").is_empty());
    assert!(seen[0].header("x-forwarded-for").is_empty());
}

#[tokio::test]
async fn test_retry_until_success() {
    let (backend, seen) = start_backend(|call, _| async move {
        if call < 2 {
            Reply::new(503, "unavailable")
        } else {
            Reply::new(200, "recovered")
        }
    })
    .await;
    let (gateway, _shutdown) = start_gateway(config(
        r#"
        [[routes]]
        id = "flaky"
        uri = "http://{backend}"

        [[routes.filters]]
        name = "Retry"
        args = { retries = 3 }
        "#,
        backend,
    ))
    .await;

    let res = client().get(format!("http://{}/flaky", gateway)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "recovered");
    assert_eq!(seen.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn test_retry_exhausted_returns_last_response() {
    let (backend, seen) = start_backend(|_, _| async { Reply::new(503, "still down") }).await;
    let (gateway, _shutdown) = start_gateway(config(
        r#"
        [[routes]]
        id = "down"
        uri = "http://{backend}"

        [[routes.filters]]
        name = "Retry"
        args = { retries = 3, backoff = { first_backoff_ms = 5, max_backoff_ms = 10, factor = 2 } }
        "#,
        backend,
    ))
    .await;

    let res = client().get(format!("http://{}/", gateway)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(res.text().await.unwrap(), "still down");
    assert_eq!(seen.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn test_retry_replays_cached_body() {
    let (backend, seen) = start_backend(|call, _| async move {
        if call == 0 {
            Reply::new(500, "boom")
        } else {
            Reply::new(200, "stored")
        }
    })
    .await;
    let (gateway, _shutdown) = start_gateway(config(
        r#"
        [[routes]]
        id = "writes"
        uri = "http://{backend}"

        [[routes.filters]]
        name = "Retry"
        args = { retries = 2, methods = ["PUT"], cache_body = true }
        "#,
        backend,
    ))
    .await;

    let res = client()
        .put(format!("http://{}/items/1", gateway))
        .body("payload")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert!(seen.iter().all(|r| r.body == b"payload"));
}

#[tokio::test]
async fn test_rate_limit_denies_second_request() {
    let (backend, seen) = start_fixed_backend("ok").await;
    let (gateway, _shutdown) = start_gateway(config(
        r#"
        [[routes]]
        id = "limited"
        uri = "http://{backend}"

        [[routes.filters]]
        name = "RequestRateLimiter"
        args = { replenish_rate = 1, burst_capacity = 1 }
        "#,
        backend,
    ))
    .await;

    let client = client();
    let first = client.get(format!("http://{}/", gateway)).send().await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()["x-ratelimit-remaining"], "0");
    assert_eq!(first.headers()["x-ratelimit-burst-capacity"], "1");

    let second = client.get(format!("http://{}/", gateway)).send().await.unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(second.headers()["x-ratelimit-remaining"], "0");
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_response_cache_serves_second_request() {
    let (backend, seen) = start_backend(|_, _| async {
        Reply::new(200, "expensive").header("Cache-Control", "max-age=3600")
    })
    .await;
    let (gateway, _shutdown) = start_gateway(config(
        r#"
        [[routes]]
        id = "cached"
        uri = "http://{backend}"

        [[routes.filters]]
        name = "LocalResponseCache"
        args = { time_to_live_secs = 30 }
        "#,
        backend,
    ))
    .await;

    let client = client();
    let first = client.get(format!("http://{}/report", gateway)).send().await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()["cache-control"], "max-age=30");
    assert_eq!(first.text().await.unwrap(), "expensive");

    // The entry is stored once the body has been streamed out.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let second = client.get(format!("http://{}/report", gateway)).send().await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    let max_age: u64 = second.headers()["cache-control"]
        .to_str()
        .unwrap()
        .trim_start_matches("max-age=")
        .parse()
        .unwrap();
    assert!(max_age <= 30);
    assert_eq!(second.text().await.unwrap(), "expensive");

    let revalidate = client
        .get(format!("http://{}/report", gateway))
        .header("Cache-Control", "no-cache")
        .send()
        .await
        .unwrap();
    assert_eq!(revalidate.status(), StatusCode::NOT_MODIFIED);

    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_no_route_is_json_404() {
    let (backend, seen) = start_fixed_backend("never").await;
    let (gateway, _shutdown) = start_gateway(config(
        r#"
        [[routes]]
        id = "only-api"
        uri = "http://{backend}"

        [[routes.predicates]]
        name = "Path"
        args = { pattern = "/api/**" }
        "#,
        backend,
    ))
    .await;

    let res = client().get(format!("http://{}/elsewhere", gateway)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(res.headers()["content-type"], "application/json");
    let json: serde_json::Value = res.json().await.unwrap();
    assert_eq!(json["status"], 404);
    assert_eq!(json["path"], "/elsewhere");
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_unreachable_backend_is_503() {
    // Bind then drop to get a port nothing listens on.
    let closed = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let (gateway, _shutdown) = start_gateway(config(
        r#"
        [[routes]]
        id = "gone"
        uri = "http://{backend}"
        "#,
        closed,
    ))
    .await;

    let res = client().get(format!("http://{}/", gateway)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_shutdown_stops_listener() {
    let (backend, _) = start_fixed_backend("ok").await;
    let (gateway, shutdown) = start_gateway(config(
        r#"
        [[routes]]
        id = "all"
        uri = "http://{backend}"
        "#,
        backend,
    ))
    .await;

    let client = client();
    assert!(client.get(format!("http://{}/", gateway)).send().await.is_ok());

    shutdown.trigger();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(client.get(format!("http://{}/", gateway)).send().await.is_err());
}
