//! Connector configuration
//!
//! The pipeline consumes one immutable [`ConnectorConfig`]. Only the binary
//! reads the environment (via [`ConnectorConfig::from_env`]); library code and
//! tests build the value directly or through [`ConnectorConfig::builder`].

use crate::client::RetryPolicy;
use crate::error::{PipelineError, Result};
use crate::store::is_valid_identifier;
use std::time::Duration;

// ============================================================================
// Defaults
// ============================================================================

/// Default MalShare base URL.
pub const DEFAULT_BASE_URL: &str = "https://malshare.com";

/// Default number of samples requested per run.
pub const DEFAULT_SAMPLE_LIMIT: usize = 25;

/// Default minimum delay between two API calls, in seconds.
pub const DEFAULT_REQUEST_DELAY_SECS: f64 = 1.0;

/// Default number of attempts per API call.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default HTTP request timeout, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default growth factor between consecutive retry waits.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Default upper bound on a single retry wait, in seconds.
pub const DEFAULT_MAX_BACKOFF_SECS: u64 = 60;

/// Default document store connection string.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/malware_intelligence";

/// Default database (PostgreSQL schema) name.
pub const DEFAULT_DATABASE_NAME: &str = "malware_intelligence";

/// Default collection (table) name.
pub const DEFAULT_COLLECTION_NAME: &str = "malshare_raw";

/// MalShare API key. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw key, for building requests only
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Where canonical documents are persisted
#[derive(Clone)]
pub struct StoreConfig {
    /// Connection string; may embed a password
    pub url: String,
    /// Database name; a PostgreSQL schema
    pub database: String,
    /// Collection name; a table inside `database`
    pub collection: String,
}

impl StoreConfig {
    /// Connection string with any password masked
    pub fn redacted_url(&self) -> String {
        redact_url(&self.url)
    }
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("url", &self.redacted_url())
            .field("database", &self.database)
            .field("collection", &self.collection)
            .finish()
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            database: DEFAULT_DATABASE_NAME.to_string(),
            collection: DEFAULT_COLLECTION_NAME.to_string(),
        }
    }
}

/// Complete, validated connector configuration
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    pub api_key: ApiKey,
    pub base_url: String,
    /// Number of identifiers requested from the listing endpoint (>= 1)
    pub sample_limit: usize,
    /// Minimum spacing between any two API calls
    pub request_delay: Duration,
    /// Attempts per API call, including the first
    pub max_retries: u32,
    pub request_timeout: Duration,
    pub backoff_multiplier: f64,
    pub max_backoff: Duration,
    /// Resolve each identifier through the details endpoint
    pub fetch_details: bool,
    pub store: StoreConfig,
}

impl ConnectorConfig {
    /// Start building a configuration around an API key
    pub fn builder(api_key: impl Into<String>) -> ConnectorConfigBuilder {
        ConnectorConfigBuilder::new(api_key)
    }

    /// Load from `.env` and the process environment, then validate
    ///
    /// Variables: `MALSHARE_API_KEY` (required), `MALSHARE_BASE_URL`,
    /// `SAMPLE_LIMIT`, `RATE_LIMIT_DELAY`, `MAX_RETRIES`, `REQUEST_TIMEOUT`,
    /// `BACKOFF_MULTIPLIER`, `MAX_BACKOFF`, `FETCH_DETAILS`, `DATABASE_URL`,
    /// `MALSHARE_DATABASE`, `MALSHARE_COLLECTION`.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let api_key = std::env::var("MALSHARE_API_KEY").map_err(|_| {
            PipelineError::invalid_config("MALSHARE_API_KEY is required (set it in .env)")
        })?;

        let mut builder = Self::builder(api_key);

        if let Ok(url) = std::env::var("MALSHARE_BASE_URL") {
            builder = builder.base_url(url);
        }
        if let Some(limit) = env_parse::<usize>("SAMPLE_LIMIT")? {
            builder = builder.sample_limit(limit);
        }
        if let Some(delay) = env_parse::<f64>("RATE_LIMIT_DELAY")? {
            builder = builder.request_delay(seconds("RATE_LIMIT_DELAY", delay)?);
        }
        if let Some(retries) = env_parse::<u32>("MAX_RETRIES")? {
            builder = builder.max_retries(retries);
        }
        if let Some(timeout) = env_parse::<u64>("REQUEST_TIMEOUT")? {
            builder = builder.request_timeout(Duration::from_secs(timeout));
        }
        if let Some(multiplier) = env_parse::<f64>("BACKOFF_MULTIPLIER")? {
            builder = builder.backoff_multiplier(multiplier);
        }
        if let Some(max_backoff) = env_parse::<u64>("MAX_BACKOFF")? {
            builder = builder.max_backoff(Duration::from_secs(max_backoff));
        }
        if let Some(fetch_details) = env_parse::<bool>("FETCH_DETAILS")? {
            builder = builder.fetch_details(fetch_details);
        }

        let mut store = StoreConfig::default();
        if let Ok(url) = std::env::var("DATABASE_URL") {
            store.url = url;
        }
        if let Ok(database) = std::env::var("MALSHARE_DATABASE") {
            store.database = database;
        }
        if let Ok(collection) = std::env::var("MALSHARE_COLLECTION") {
            store.collection = collection;
        }

        builder.store(store).build()
    }

    /// Check every invariant the pipeline relies on
    pub fn validate(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(PipelineError::invalid_config("MALSHARE_API_KEY cannot be empty"));
        }

        let base = self.base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(PipelineError::invalid_config(format!(
                "Base URL must start with http:// or https://, got '{}'",
                self.base_url
            )));
        }

        validate_sample_limit(self.sample_limit)?;

        if self.max_retries == 0 {
            return Err(PipelineError::invalid_config("Max retries must be at least 1"));
        }

        if self.request_timeout.is_zero() {
            return Err(PipelineError::invalid_config("Request timeout must be greater than 0"));
        }

        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(PipelineError::invalid_config(format!(
                "Backoff multiplier must be >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }

        if self.store.url.trim().is_empty() {
            return Err(PipelineError::invalid_config("DATABASE_URL cannot be empty"));
        }

        validate_identifier("database", &self.store.database)?;
        validate_identifier("collection", &self.store.collection)?;

        Ok(())
    }

    /// Retry policy derived from the delay/backoff settings
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            base_delay: self.request_delay,
            multiplier: self.backoff_multiplier,
            max_backoff: self.max_backoff,
        }
    }

    /// Same configuration with a different sample limit, re-validated
    pub fn with_sample_limit(&self, limit: usize) -> Result<Self> {
        validate_sample_limit(limit)?;
        Ok(Self {
            sample_limit: limit,
            ..self.clone()
        })
    }
}

/// Builder for ConnectorConfig
#[derive(Debug)]
pub struct ConnectorConfigBuilder {
    config: ConnectorConfig,
}

impl ConnectorConfigBuilder {
    fn new(api_key: impl Into<String>) -> Self {
        Self {
            config: ConnectorConfig {
                api_key: ApiKey::new(api_key),
                base_url: DEFAULT_BASE_URL.to_string(),
                sample_limit: DEFAULT_SAMPLE_LIMIT,
                request_delay: Duration::from_secs_f64(DEFAULT_REQUEST_DELAY_SECS),
                max_retries: DEFAULT_MAX_RETRIES,
                request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
                backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
                max_backoff: Duration::from_secs(DEFAULT_MAX_BACKOFF_SECS),
                fetch_details: true,
                store: StoreConfig::default(),
            },
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn sample_limit(mut self, limit: usize) -> Self {
        self.config.sample_limit = limit;
        self
    }

    pub fn request_delay(mut self, delay: Duration) -> Self {
        self.config.request_delay = delay;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.config.backoff_multiplier = multiplier;
        self
    }

    pub fn max_backoff(mut self, max_backoff: Duration) -> Self {
        self.config.max_backoff = max_backoff;
        self
    }

    pub fn fetch_details(mut self, fetch: bool) -> Self {
        self.config.fetch_details = fetch;
        self
    }

    pub fn store(mut self, store: StoreConfig) -> Self {
        self.config.store = store;
        self
    }

    /// Validate and return the configuration
    pub fn build(self) -> Result<ConnectorConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

pub(crate) fn validate_sample_limit(limit: usize) -> Result<()> {
    if limit == 0 {
        return Err(PipelineError::invalid_config("Sample limit must be at least 1"));
    }
    Ok(())
}

/// Names interpolated into SQL must be plain identifiers
fn validate_identifier(kind: &str, name: &str) -> Result<()> {
    if !is_valid_identifier(name) {
        return Err(PipelineError::invalid_config(format!(
            "Invalid {} name '{}': use letters, digits and underscores (max 63 chars)",
            kind, name
        )));
    }
    Ok(())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().map(Some).map_err(|_| {
            PipelineError::invalid_config(format!("{} has an invalid value: '{}'", name, raw))
        }),
        Err(_) => Ok(None),
    }
}

fn seconds(name: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value).map_err(|_| {
        PipelineError::invalid_config(format!("{} must be a non-negative number of seconds", name))
    })
}

fn redact_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let Some((userinfo, host)) = rest.rsplit_once('@') else {
        return url.to_string();
    };
    match userinfo.split_once(':') {
        Some((user, _password)) => format!("{}://{}:***@{}", scheme, user, host),
        None => url.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ENV_VARS: &[&str] = &[
        "MALSHARE_API_KEY",
        "MALSHARE_BASE_URL",
        "SAMPLE_LIMIT",
        "RATE_LIMIT_DELAY",
        "MAX_RETRIES",
        "REQUEST_TIMEOUT",
        "BACKOFF_MULTIPLIER",
        "MAX_BACKOFF",
        "FETCH_DETAILS",
        "DATABASE_URL",
        "MALSHARE_DATABASE",
        "MALSHARE_COLLECTION",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_builder_defaults() {
        let config = ConnectorConfig::builder("key").build().unwrap();
        assert_eq!(config.base_url, "https://malshare.com");
        assert_eq!(config.sample_limit, 25);
        assert_eq!(config.request_delay, Duration::from_secs(1));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(config.fetch_details);
        assert_eq!(config.store.database, "malware_intelligence");
        assert_eq!(config.store.collection, "malshare_raw");
    }

    #[test]
    fn test_zero_limit_is_invalid() {
        let result = ConnectorConfig::builder("key").sample_limit(0).build();
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn test_with_sample_limit_revalidates() {
        let config = ConnectorConfig::builder("key").build().unwrap();
        assert_eq!(config.with_sample_limit(5).unwrap().sample_limit, 5);
        assert!(config.with_sample_limit(0).is_err());
    }

    #[test]
    fn test_empty_api_key_is_invalid() {
        assert!(ConnectorConfig::builder("   ").build().is_err());
    }

    #[test]
    fn test_zero_retries_is_invalid() {
        assert!(ConnectorConfig::builder("key").max_retries(0).build().is_err());
    }

    #[test]
    fn test_base_url_scheme_is_checked() {
        assert!(ConnectorConfig::builder("key")
            .base_url("ftp://malshare.com")
            .build()
            .is_err());
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let config = ConnectorConfig::builder("key")
            .base_url("http://localhost:8080/")
            .build()
            .unwrap();
        assert_eq!(config.base_url, "http://localhost:8080");
    }

    #[test]
    fn test_collection_name_must_be_identifier() {
        let store = StoreConfig {
            collection: "samples; DROP TABLE x".to_string(),
            ..StoreConfig::default()
        };
        assert!(ConnectorConfig::builder("key").store(store).build().is_err());
    }

    #[test]
    fn test_retry_policy_mirrors_config() {
        let config = ConnectorConfig::builder("key")
            .max_retries(5)
            .request_delay(Duration::from_millis(250))
            .build()
            .unwrap();
        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay, Duration::from_millis(250));
        assert_eq!(policy.multiplier, 2.0);
    }

    #[test]
    fn test_debug_hides_secrets() {
        let store = StoreConfig {
            url: "postgresql://etl:hunter2@db:5432/intel".to_string(),
            ..StoreConfig::default()
        };
        let config = ConnectorConfig::builder("super-secret-key")
            .store(store)
            .build()
            .unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret-key"));
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("postgresql://etl:***@db:5432/intel"));
    }

    #[test]
    fn test_redact_url_without_password() {
        assert_eq!(redact_url("postgresql://localhost/db"), "postgresql://localhost/db");
        assert_eq!(redact_url("postgresql://etl@db/intel"), "postgresql://etl@db/intel");
    }

    #[test]
    #[serial]
    fn test_from_env_reads_overrides() {
        clear_env();
        std::env::set_var("MALSHARE_API_KEY", "test_api_key_123");
        std::env::set_var("SAMPLE_LIMIT", "10");
        std::env::set_var("RATE_LIMIT_DELAY", "0.1");
        std::env::set_var("MAX_RETRIES", "2");
        std::env::set_var("REQUEST_TIMEOUT", "10");
        std::env::set_var("MALSHARE_DATABASE", "test_malware_db");

        let config = ConnectorConfig::from_env();
        clear_env();
        let config = config.unwrap();

        assert_eq!(config.api_key.expose(), "test_api_key_123");
        assert_eq!(config.sample_limit, 10);
        assert_eq!(config.request_delay.as_millis(), 100);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.store.database, "test_malware_db");
    }

    #[test]
    #[serial]
    fn test_from_env_requires_api_key() {
        clear_env();
        let result = ConnectorConfig::from_env();
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_garbage_numbers() {
        clear_env();
        std::env::set_var("MALSHARE_API_KEY", "key");
        std::env::set_var("MAX_RETRIES", "three");

        let result = ConnectorConfig::from_env();
        clear_env();

        let err = result.unwrap_err().to_string();
        assert!(err.contains("MAX_RETRIES"));
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_negative_delay() {
        clear_env();
        std::env::set_var("MALSHARE_API_KEY", "key");
        std::env::set_var("RATE_LIMIT_DELAY", "-1");

        let result = ConnectorConfig::from_env();
        clear_env();

        assert!(result.is_err());
    }
}
