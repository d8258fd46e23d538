//! Sample extraction from the MalShare API
//!
//! One listing call yields up to `limit` identifiers; each is then enriched
//! with a details call. Only the listing call can fail the extraction. A
//! failed details call leaves that sample with its listing entry alone.
//!
//! Listing objects are identified by `sha256`, else `md5`, else `sha1`; the
//! details endpoint accepts any of the three. Objects with none of them are
//! still passed on so the transformer counts them as dropped.

use crate::client::{Endpoint, HttpTransport, RateLimitedClient, RawPayload, Transport};
use crate::config::validate_sample_limit;
use crate::error::{FetchError, PipelineError, Result};
use crate::models::{Enrichment, ExtractedSample, RawSampleRecord};
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// One entry of the listing response
#[derive(Debug, Clone, PartialEq)]
struct ListingEntry {
    /// `None` when the entry carries no hash at all
    identifier: Option<String>,
    record: RawSampleRecord,
}

impl ListingEntry {
    /// The listing entry as it stands, without details
    fn into_sample(self, enrichment: Enrichment) -> ExtractedSample {
        ExtractedSample {
            identifier: self.identifier.unwrap_or_default(),
            record: self.record,
            enrichment,
        }
    }
}

/// Pulls samples through a [`RateLimitedClient`]
pub struct Extractor<T = HttpTransport> {
    client: RateLimitedClient<T>,
    fetch_details: bool,
}

impl<T: Transport> Extractor<T> {
    pub fn new(client: RateLimitedClient<T>, fetch_details: bool) -> Self {
        Self {
            client,
            fetch_details,
        }
    }

    /// Fetch up to `limit` samples, in listing order
    pub async fn extract(&self, limit: usize) -> Result<Vec<ExtractedSample>> {
        validate_sample_limit(limit)?;

        info!(limit, "Fetching sample listing");
        let payload = self
            .client
            .fetch(Endpoint::List, &[])
            .await
            .map_err(PipelineError::SourceUnavailable)?;

        let entries = parse_listing(payload, limit).map_err(PipelineError::SourceUnavailable)?;
        info!(count = entries.len(), "Listing received");

        if !self.fetch_details {
            return Ok(entries
                .into_iter()
                .map(|entry| entry.into_sample(Enrichment::ListingOnly))
                .collect());
        }

        let total = entries.len();
        let mut samples = Vec::with_capacity(total);

        for (index, entry) in entries.into_iter().enumerate() {
            let Some(identifier) = entry.identifier.clone() else {
                warn!(position = index + 1, "Listing entry has no hash, skipping details");
                samples.push(entry.into_sample(Enrichment::Partial));
                continue;
            };

            debug!(
                identifier = %identifier,
                position = index + 1,
                total,
                "Fetching sample details"
            );

            let sample = match self.fetch_record(&identifier).await {
                Ok(mut record) => {
                    // Details enrich the listing entry, they never lose its fields
                    record.fill_missing(&entry.record);
                    ExtractedSample {
                        identifier,
                        record,
                        enrichment: Enrichment::Enriched,
                    }
                },
                Err(e) => {
                    warn!(
                        identifier = %identifier,
                        error = %e,
                        "Details unavailable, continuing with listing entry"
                    );
                    entry.into_sample(Enrichment::Partial)
                },
            };
            samples.push(sample);
        }

        Ok(samples)
    }

    async fn fetch_record(
        &self,
        identifier: &str,
    ) -> std::result::Result<RawSampleRecord, FetchError> {
        let payload = self
            .client
            .fetch(Endpoint::Details, &[("hash", identifier)])
            .await?;

        let value = into_json(payload)
            .ok_or_else(|| decode_error(Endpoint::Details, "expected a JSON object"))?;

        if let Some(error) = value.get("ERROR") {
            return Err(decode_error(
                Endpoint::Details,
                format!("service reported an error: {}", error),
            ));
        }

        RawSampleRecord::from_value(value)
            .ok_or_else(|| decode_error(Endpoint::Details, "expected a JSON object"))
    }
}

fn decode_error(endpoint: Endpoint, message: impl Into<String>) -> FetchError {
    FetchError::Decode {
        endpoint,
        message: message.into(),
    }
}

/// JSON value of a payload; a text body is accepted if it parses as JSON
fn into_json(payload: RawPayload) -> Option<Value> {
    match payload {
        RawPayload::Json(value) => Some(value),
        RawPayload::Lines(lines) => serde_json::from_str(&lines.join("\n")).ok(),
    }
}

/// Identifiers from any listing shape the API produces, deduplicated, at
/// most `limit` of them
fn parse_listing(
    payload: RawPayload,
    limit: usize,
) -> std::result::Result<Vec<ListingEntry>, FetchError> {
    let candidates: Vec<ListingEntry> = match payload {
        RawPayload::Lines(lines) if looks_like_json(&lines) => {
            let value = serde_json::from_str(&lines.join("\n"))
                .map_err(|e| decode_error(Endpoint::List, e.to_string()))?;
            json_listing(value)?
        },
        RawPayload::Lines(lines) => lines
            .into_iter()
            .filter_map(|line| identifier_entry(&line))
            .collect(),
        RawPayload::Json(value) => json_listing(value)?,
    };

    let mut seen = HashSet::new();
    Ok(candidates
        .into_iter()
        .filter(|entry| match &entry.identifier {
            Some(identifier) => seen.insert(identifier.to_lowercase()),
            None => true,
        })
        .take(limit)
        .collect())
}

fn looks_like_json(lines: &[String]) -> bool {
    lines
        .first()
        .is_some_and(|line| line.starts_with('[') || line.starts_with('{'))
}

/// Listing object fields accepted as the details `hash` parameter, by preference
const IDENTIFYING_FIELDS: [&str; 3] = ["sha256", "md5", "sha1"];

fn json_listing(value: Value) -> std::result::Result<Vec<ListingEntry>, FetchError> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut fields) => match fields.remove("data") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(decode_error(
                    Endpoint::List,
                    "listing object has no 'data' array",
                ))
            },
        },
        other => {
            return Err(decode_error(
                Endpoint::List,
                format!("unexpected listing value: {}", other),
            ))
        },
    };

    Ok(items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(s) => identifier_entry(&s),
            Value::Object(fields) => {
                let record = RawSampleRecord::new(fields);
                let identifier = IDENTIFYING_FIELDS
                    .iter()
                    .find_map(|key| record.text(key))
                    .map(str::to_string);
                if identifier.is_none() {
                    debug!("Listing entry has no sha256, md5 or sha1");
                }
                Some(ListingEntry { identifier, record })
            },
            _ => None,
        })
        .collect())
}

fn identifier_entry(raw: &str) -> Option<ListingEntry> {
    let identifier = raw.trim();
    if identifier.is_empty() {
        return None;
    }
    Some(ListingEntry {
        identifier: Some(identifier.to_string()),
        record: RawSampleRecord::from_identifier(identifier),
    })
}
