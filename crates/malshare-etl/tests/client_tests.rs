//! HTTP client behaviour against a mocked MalShare API

mod common;

use common::{init_tracing, test_config, API_KEY};
use malshare_etl::client::{Endpoint, RateLimitedClient, RawPayload};
use malshare_etl::error::{FetchError, TransientCause};
use serde_json::json;
use std::time::{Duration, Instant};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_request_wire_format() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api.php"))
        .and(query_param("api_key", API_KEY))
        .and(query_param("action", "details"))
        .and(query_param("hash", "abc123"))
        .and(header("user-agent", "MalShare-ETL-Connector/1.0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"SHA256": "abc123"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = RateLimitedClient::from_config(&test_config(&server, 1)).unwrap();
    let payload = client
        .fetch(Endpoint::Details, &[("hash", "abc123")])
        .await
        .unwrap();

    assert_eq!(payload, RawPayload::Json(json!({"SHA256": "abc123"})));
}

#[tokio::test]
async fn test_text_listing_is_split_into_lines() {
    let server = MockServer::start().await;

    Mock::given(query_param("action", "getlist"))
        .respond_with(ResponseTemplate::new(200).set_body_string("aaa\r\nbbb\n\n  ccc  \n"))
        .mount(&server)
        .await;

    let client = RateLimitedClient::from_config(&test_config(&server, 1)).unwrap();
    let payload = client.fetch(Endpoint::List, &[]).await.unwrap();

    assert_eq!(
        payload,
        RawPayload::Lines(vec!["aaa".into(), "bbb".into(), "ccc".into()])
    );
}

#[tokio::test]
async fn test_rate_limited_request_is_retried() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(query_param("action", "getlist"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(query_param("action", "getlist"))
        .respond_with(ResponseTemplate::new(200).set_body_string("aaa"))
        .mount(&server)
        .await;

    // max_backoff of 20ms caps the one second Retry-After
    let client = RateLimitedClient::from_config(&test_config(&server, 1)).unwrap();
    let started = Instant::now();
    let payload = client.fetch(Endpoint::List, &[]).await.unwrap();

    assert_eq!(payload, RawPayload::Lines(vec!["aaa".into()]));
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_forbidden_is_an_authentication_error() {
    let server = MockServer::start().await;

    Mock::given(query_param("action", "getlist"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let client = RateLimitedClient::from_config(&test_config(&server, 1)).unwrap();
    let err = client.fetch(Endpoint::List, &[]).await.unwrap_err();

    assert!(matches!(err, FetchError::Authentication { status: 403, .. }));
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(query_param("action", "details"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let client = RateLimitedClient::from_config(&test_config(&server, 1)).unwrap();
    let err = client
        .fetch(Endpoint::Details, &[("hash", "missing")])
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Rejected { status: 404, .. }));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_network_errors_never_expose_api_key() {
    init_tracing();
    let server = MockServer::start().await;
    let mut config = test_config(&server, 1);
    // Nothing listens on port 1
    config.base_url = "http://127.0.0.1:1".to_string();

    let client = RateLimitedClient::from_config(&config).unwrap();
    let err = client.fetch(Endpoint::List, &[]).await.unwrap_err();

    match &err {
        FetchError::TransientFetch {
            attempts,
            cause: TransientCause::Network(_),
            ..
        } => assert_eq!(*attempts, 3),
        other => panic!("expected network failure, got {:?}", other),
    }
    assert!(!err.to_string().contains(API_KEY));
    assert!(!format!("{:?}", err).contains(API_KEY));
}

#[tokio::test]
async fn test_consecutive_calls_are_spaced() {
    let server = MockServer::start().await;

    Mock::given(query_param("action", "getlist"))
        .respond_with(ResponseTemplate::new(200).set_body_string("aaa"))
        .expect(3)
        .mount(&server)
        .await;

    let mut config = test_config(&server, 1);
    config.request_delay = Duration::from_millis(100);

    let client = RateLimitedClient::from_config(&config).unwrap();
    let started = Instant::now();
    for _ in 0..3 {
        client.fetch(Endpoint::List, &[]).await.unwrap();
    }

    assert!(started.elapsed() >= Duration::from_millis(200));
}
