//! Rate-limited MalShare API client
//!
//! [`RateLimitedClient`] wraps a single-request [`Transport`] with two
//! guarantees that hold regardless of which endpoint is called:
//!
//! 1. consecutive calls are spaced at least `min_interval` apart, and
//! 2. transient failures are retried according to a [`RetryPolicy`].
//!
//! Authentication failures and other permanent rejections are returned on the
//! first attempt.

pub mod http;
pub mod retry;

pub use http::HttpTransport;
pub use retry::RetryPolicy;

use crate::config::ConnectorConfig;
use crate::error::{AttemptFailure, FetchError};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// The two MalShare API actions used by the connector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Recent sample identifiers (`action=getlist`)
    List,
    /// Metadata for one sample (`action=details`)
    Details,
}

impl Endpoint {
    /// Value of the `action` query parameter
    pub fn action(self) -> &'static str {
        match self {
            Endpoint::List => "getlist",
            Endpoint::Details => "details",
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.action())
    }
}

/// Decoded response body
#[derive(Debug, Clone, PartialEq)]
pub enum RawPayload {
    /// `application/json` body
    Json(Value),
    /// Any other body, split into trimmed lines
    Lines(Vec<String>),
}

impl RawPayload {
    /// Split a text body into trimmed, non-empty lines
    pub fn from_text(text: &str) -> Self {
        RawPayload::Lines(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }
}

/// Performs exactly one request; no delay, no retry
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        endpoint: Endpoint,
        params: &[(&str, &str)],
    ) -> Result<RawPayload, AttemptFailure>;
}

/// Transport wrapper enforcing request spacing and bounded retry
pub struct RateLimitedClient<T = HttpTransport> {
    transport: T,
    policy: RetryPolicy,
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimitedClient<HttpTransport> {
    /// HTTP client for the configured MalShare instance
    pub fn from_config(config: &ConnectorConfig) -> Result<Self, FetchError> {
        let transport = HttpTransport::new(
            &config.base_url,
            config.api_key.clone(),
            config.request_timeout,
        )?;
        Ok(Self::new(transport, config.retry_policy(), config.request_delay))
    }
}

impl<T: Transport> RateLimitedClient<T> {
    pub fn new(transport: T, policy: RetryPolicy, min_interval: Duration) -> Self {
        Self {
            transport,
            policy,
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Call `endpoint` with `params`, waiting and retrying as configured
    pub async fn fetch(
        &self,
        endpoint: Endpoint,
        params: &[(&str, &str)],
    ) -> Result<RawPayload, FetchError> {
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(%endpoint, attempt, "Sending API request");

            let result = self.send_spaced(endpoint, params).await;

            let cause = match result {
                Ok(payload) => return Ok(payload),
                Err(AttemptFailure::Fatal(err)) => return Err(err),
                Err(AttemptFailure::Transient(cause)) => cause,
            };

            if !self.policy.should_retry(attempt) {
                warn!(
                    %endpoint,
                    attempts = attempt,
                    error = %cause,
                    "All attempts failed"
                );
                return Err(FetchError::TransientFetch {
                    endpoint,
                    attempts: attempt,
                    cause,
                });
            }

            let wait = self.policy.wait_for(attempt, &cause);
            warn!(
                %endpoint,
                attempt,
                max_attempts = self.policy.max_attempts,
                wait_ms = wait.as_millis() as u64,
                error = %cause,
                "Request failed, retrying"
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// One transport call, started no sooner than `min_interval` after the
    /// previous call finished
    async fn send_spaced(
        &self,
        endpoint: Endpoint,
        params: &[(&str, &str)],
    ) -> Result<RawPayload, AttemptFailure> {
        let mut last_call = self.last_call.lock().await;

        if let Some(finished) = *last_call {
            let elapsed = finished.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }

        let result = self.transport.send(endpoint, params).await;
        *last_call = Some(Instant::now());
        result
    }
}
