//! reqwest-backed [`Transport`] for the MalShare HTTP API
//!
//! Every call is `GET {base_url}/api.php?api_key=..&action=..` plus any
//! extra parameters. Errors never carry the request URL, since the URL holds
//! the API key.

use super::{Endpoint, RawPayload, Transport};
use crate::config::ApiKey;
use crate::error::{AttemptFailure, FetchError, TransientCause};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, ACCEPT, CONTENT_TYPE, RETRY_AFTER};
use reqwest::StatusCode;
use std::time::Duration;

/// User-Agent sent with every request
pub const USER_AGENT: &str = "MalShare-ETL-Connector/1.0";

/// One HTTP request per [`Transport::send`]
pub struct HttpTransport {
    client: reqwest::Client,
    api_url: String,
    api_key: ApiKey,
}

impl HttpTransport {
    pub fn new(base_url: &str, api_key: ApiKey, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Client(e.without_url().to_string()))?;

        Ok(Self {
            client,
            api_url: format!("{}/api.php", base_url.trim_end_matches('/')),
            api_key,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        endpoint: Endpoint,
        params: &[(&str, &str)],
    ) -> Result<RawPayload, AttemptFailure> {
        let mut query: Vec<(&str, &str)> = Vec::with_capacity(params.len() + 2);
        query.push(("api_key", self.api_key.expose()));
        query.push(("action", endpoint.action()));
        query.extend_from_slice(params);

        let response = self
            .client
            .get(&self.api_url)
            .header(ACCEPT, "application/json")
            .query(&query)
            .send()
            .await
            .map_err(request_failure)?;

        if let Some(failure) = classify_status(endpoint, response.status(), response.headers()) {
            return Err(failure);
        }

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.contains("json"));

        let body = response.bytes().await.map_err(request_failure)?;
        decode_body(endpoint, &body, is_json)
    }
}

/// Map a non-success status to the matching failure; `None` on success
fn classify_status(
    endpoint: Endpoint,
    status: StatusCode,
    headers: &HeaderMap,
) -> Option<AttemptFailure> {
    if status.is_success() {
        return None;
    }

    let failure = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            AttemptFailure::Fatal(FetchError::Authentication {
                endpoint,
                status: status.as_u16(),
            })
        },
        StatusCode::TOO_MANY_REQUESTS => AttemptFailure::Transient(TransientCause::RateLimited {
            retry_after: retry_after(headers),
        }),
        s if s.is_server_error() => {
            AttemptFailure::Transient(TransientCause::ServerError { status: s.as_u16() })
        },
        s => AttemptFailure::Fatal(FetchError::Rejected {
            endpoint,
            status: s.as_u16(),
        }),
    };
    Some(failure)
}

/// `Retry-After` in delta-seconds form; HTTP-date values are ignored
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn decode_body(
    endpoint: Endpoint,
    body: &[u8],
    is_json: bool,
) -> Result<RawPayload, AttemptFailure> {
    if is_json {
        return serde_json::from_slice(body)
            .map(RawPayload::Json)
            .map_err(|e| {
                AttemptFailure::Fatal(FetchError::Decode {
                    endpoint,
                    message: e.to_string(),
                })
            });
    }
    Ok(RawPayload::from_text(&String::from_utf8_lossy(body)))
}

/// Connection, timeout and body errors are all worth another attempt, except
/// a request that could not even be built
fn request_failure(err: reqwest::Error) -> AttemptFailure {
    let err = err.without_url();
    if err.is_builder() {
        AttemptFailure::Fatal(FetchError::Client(err.to_string()))
    } else {
        AttemptFailure::Transient(TransientCause::Network(err.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn classify(status: u16) -> Option<AttemptFailure> {
        classify_status(
            Endpoint::Details,
            StatusCode::from_u16(status).unwrap(),
            &HeaderMap::new(),
        )
    }

    #[test]
    fn test_success_is_not_a_failure() {
        assert!(classify(200).is_none());
    }

    #[test]
    fn test_auth_statuses_are_fatal() {
        for status in [401, 403] {
            match classify(status) {
                Some(AttemptFailure::Fatal(FetchError::Authentication { status: s, .. })) => {
                    assert_eq!(s, status)
                },
                other => panic!("unexpected classification for {}: {:?}", status, other),
            }
        }
    }

    #[test]
    fn test_server_errors_are_transient() {
        assert!(matches!(
            classify(503),
            Some(AttemptFailure::Transient(TransientCause::ServerError { status: 503 }))
        ));
    }

    #[test]
    fn test_not_found_is_rejected() {
        assert!(matches!(
            classify(404),
            Some(AttemptFailure::Fatal(FetchError::Rejected { status: 404, .. }))
        ));
    }

    #[test]
    fn test_rate_limit_reads_retry_after() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("12"));

        let failure = classify_status(Endpoint::List, StatusCode::TOO_MANY_REQUESTS, &headers);

        match failure {
            Some(AttemptFailure::Transient(TransientCause::RateLimited { retry_after })) => {
                assert_eq!(retry_after, Some(Duration::from_secs(12)))
            },
            other => panic!("unexpected classification: {:?}", other),
        }
    }

    #[test]
    fn test_retry_after_http_date_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2026 07:28:00 GMT"));
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn test_text_body_becomes_lines() {
        let payload = decode_body(Endpoint::List, b"aaa\nbbb\n", false).unwrap();
        assert_eq!(payload, RawPayload::Lines(vec!["aaa".into(), "bbb".into()]));
    }

    #[test]
    fn test_malformed_json_is_a_decode_error() {
        let failure = decode_body(Endpoint::Details, b"{not json", true).unwrap_err();
        assert!(matches!(failure, AttemptFailure::Fatal(FetchError::Decode { .. })));
    }

    #[test]
    fn test_api_url_is_built_from_base() {
        let transport = HttpTransport::new(
            "https://malshare.example/",
            ApiKey::new("k"),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(transport.api_url, "https://malshare.example/api.php");
    }
}
