//! Shared helpers for MalShare ETL integration tests
//!
//! A wiremock server stands in for the MalShare API: the listing is a plain
//! text body of hashes and the details endpoint answers for any hash, except
//! the ones configured to fail with HTTP 500.

#![allow(dead_code)]

use malshare_etl::config::ConnectorConfig;
use serde_json::json;
use std::collections::HashSet;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const API_KEY: &str = "integration-test-key";

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,malshare_etl=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Deterministic 64-character sample hash
pub fn sample_hash(index: usize) -> String {
    format!("{:064x}", index + 1)
}

pub fn sample_hashes(count: usize) -> Vec<String> {
    (0..count).map(sample_hash).collect()
}

/// Fast-retrying configuration pointed at `server`
pub fn test_config(server: &MockServer, limit: usize) -> ConnectorConfig {
    ConnectorConfig::builder(API_KEY)
        .base_url(server.uri())
        .sample_limit(limit)
        .request_delay(Duration::from_millis(1))
        .max_retries(3)
        .max_backoff(Duration::from_millis(20))
        .request_timeout(Duration::from_secs(5))
        .build()
        .expect("valid test configuration")
}

/// Details responses keyed on the `hash` query parameter
pub struct DetailsResponder {
    failing: HashSet<String>,
}

impl DetailsResponder {
    pub fn new(failing: impl IntoIterator<Item = String>) -> Self {
        Self {
            failing: failing.into_iter().collect(),
        }
    }
}

impl Respond for DetailsResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let hash = request
            .url
            .query_pairs()
            .find(|(key, _)| key == "hash")
            .map(|(_, value)| value.into_owned())
            .unwrap_or_default();

        if self.failing.contains(&hash) {
            return ResponseTemplate::new(500);
        }

        ResponseTemplate::new(200).set_body_json(json!({
            "MD5": "D41D8CD98F00B204E9800998ECF8427E",
            "SHA1": "DA39A3EE5E6B4B0D3255BFEF95601890AFD80709",
            "SHA256": hash.to_uppercase(),
            "SSDEEP": "3::",
            "F_TYPE": "PE32 executable (GUI) Intel 80386, for MS Windows",
            "SOURCES": ["http://example.test/payload.exe"],
            "ADDED": "2024-01-15 10:30:00"
        }))
    }
}

/// Listing endpoint returning `hashes` as text lines
pub async fn mount_listing(server: &MockServer, hashes: &[String]) {
    Mock::given(method("GET"))
        .and(path("/api.php"))
        .and(query_param("action", "getlist"))
        .respond_with(ResponseTemplate::new(200).set_body_string(hashes.join("\n")))
        .mount(server)
        .await;
}

/// Details endpoint failing for every hash in `failing`
pub async fn mount_details(server: &MockServer, failing: Vec<String>) {
    Mock::given(method("GET"))
        .and(path("/api.php"))
        .and(query_param("action", "details"))
        .respond_with(DetailsResponder::new(failing))
        .mount(server)
        .await;
}
