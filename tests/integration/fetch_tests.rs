//! Retry, backoff and credential bootstrap against a mock upstream

use crate::common::{room_page, test_config, API_KEY};
use stay_harvest::fetch::{Component, FetchErrorKind, Fetcher, RequestSpec};
use stay_harvest::session::{bootstrap, bootstrap_or_fallback, CredentialError, KeySource};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetcher_for(server: &MockServer, client_extra: &str) -> (Fetcher, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&server.uri(), dir.path(), client_extra);
    (Fetcher::new(&config.retry), dir)
}

fn spec(server: &MockServer, route: &str) -> RequestSpec {
    let url = Url::parse(&format!("{}{}", server.uri(), route)).unwrap();
    RequestSpec::api(Component::Calendar, url)
}

#[tokio::test]
async fn test_success_on_first_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"data\":{}}"))
        .expect(1)
        .mount(&server)
        .await;

    let (fetcher, _dir) = fetcher_for(&server, "");
    let response = fetcher
        .execute(&spec(&server, "/ok"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.attempts, 1);
    assert_eq!(response.text(), "{\"data\":{}}");
}

#[tokio::test]
async fn test_rate_limited_twice_then_success() {
    let server = MockServer::start().await;
    // Mounted first so it takes precedence until exhausted.
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let (fetcher, _dir) = fetcher_for(&server, "");
    let started = Instant::now();
    let response = fetcher
        .execute(&spec(&server, "/flaky"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(response.attempts, 3);
    assert_eq!(response.body, b"ok");
    // 20ms * 2^1 + 20ms * 2^2, plus under 10ms of jitter per wait
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(120), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(140 + 360), "{elapsed:?}");
}

#[tokio::test]
async fn test_server_error_exhausts_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500).insert_header("x-request-id", "abc"))
        .expect(5)
        .mount(&server)
        .await;

    let (fetcher, _dir) = fetcher_for(&server, "");
    let err = fetcher
        .execute(&spec(&server, "/broken"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.attempts, 5);
    assert!(matches!(err.kind, FetchErrorKind::Status(500)));
    assert_eq!(err.last_status(), Some(500));
    assert_eq!(err.component, Component::Calendar);
    let meta = err.response.as_ref().unwrap();
    assert_eq!(meta.headers.get("x-request-id").unwrap(), "abc");
    assert!(!err.url.contains('?'));
}

#[tokio::test]
async fn test_rate_limit_exhaustion_is_distinguishable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "30"))
        .mount(&server)
        .await;

    let (fetcher, _dir) = fetcher_for(&server, "");
    let err = fetcher
        .execute(&spec(&server, "/limited"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.is_rate_limited());
    assert_eq!(err.attempts, 5);
    assert_eq!(err.response.as_ref().and_then(|m| m.retry_after()), Some("30"));
}

#[tokio::test]
async fn test_client_error_retried_by_default() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(5)
        .mount(&server)
        .await;

    let (fetcher, _dir) = fetcher_for(&server, "");
    let err = fetcher
        .execute(&spec(&server, "/missing"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.attempts, 5);
    assert_eq!(err.last_status(), Some(404));
}

#[tokio::test]
async fn test_server_errors_scope_fails_fast_on_client_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&server.uri(), dir.path(), "");
    config.retry.retry_on = stay_harvest::config::RetryScope::ServerErrors;
    let fetcher = Fetcher::new(&config.retry);

    let err = fetcher
        .execute(&spec(&server, "/missing"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.attempts, 1);
    assert!(matches!(err.kind, FetchErrorKind::Status(404)));
}

#[tokio::test]
async fn test_redirect_is_not_followed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/moved"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/login"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (fetcher, _dir) = fetcher_for(&server, "");
    let err = fetcher
        .execute_once(&spec(&server, "/moved"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.last_status(), Some(302));
    let meta = err.response.unwrap();
    assert_eq!(meta.headers.get("location").unwrap(), "/login");
}

#[tokio::test]
async fn test_cancel_during_backoff() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&server.uri(), dir.path(), "");
    config.retry.backoff_base_ms = 10_000;
    let fetcher = Fetcher::new(&config.retry);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = fetcher.execute(&spec(&server, "/slow"), &cancel).await.unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(err.attempts, 1);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_bootstrap_extracts_key_and_cookies() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rooms/42"))
        .and(header("sec-fetch-mode", "navigate"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "bev=session-token; Path=/")
                .set_body_string(room_page(42)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (fetcher, _dir) = fetcher_for(&server, "");
    let page_url = Url::parse(&format!("{}/rooms/42", server.uri())).unwrap();
    let result = bootstrap(&fetcher, &page_url, None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.credentials.api_key, API_KEY);
    assert_eq!(result.credentials.source, KeySource::Extracted);
    assert_eq!(result.credentials.cookie_header().as_deref(), Some("bev=session-token"));
    assert!(result.page.unwrap().contains("data-deferred-state"));
}

#[tokio::test]
async fn test_bootstrap_is_never_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rooms/42"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let (fetcher, _dir) = fetcher_for(&server, "");
    let page_url = Url::parse(&format!("{}/rooms/42", server.uri())).unwrap();
    let err = bootstrap(&fetcher, &page_url, None, &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        CredentialError::Fetch(e) => {
            assert_eq!(e.attempts, 1);
            assert_eq!(e.component, Component::Bootstrap);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_bootstrap_without_key_falls_back() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rooms/42"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>no key here</html>"))
        .mount(&server)
        .await;

    let (fetcher, _dir) = fetcher_for(&server, "");
    let page_url = Url::parse(&format!("{}/rooms/42", server.uri())).unwrap();
    let cancel = CancellationToken::new();

    let err = bootstrap_or_fallback(&fetcher, &page_url, None, None, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, CredentialError::KeyNotFound { .. }));

    let result = bootstrap_or_fallback(&fetcher, &page_url, None, Some("static-key"), &cancel)
        .await
        .unwrap();
    assert_eq!(result.credentials.api_key, "static-key");
    assert_eq!(result.credentials.source, KeySource::Fallback);
    assert!(result.page.is_none());
}
