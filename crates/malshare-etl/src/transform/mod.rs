//! Raw record to canonical document transformation
//!
//! [`Transformer::transform_at`] is a pure function of the raw record and the
//! ingestion time. It normalizes hashes, parses the added date, classifies
//! the file type and scores completeness. A record without a SHA-256 yields
//! `None`.

pub mod classify;
pub mod completeness;

pub use classify::{classify, ClassificationRule, CLASSIFICATION_RULES};
pub use completeness::{CompletenessWeights, TRACKED_FIELDS};

use crate::models::{
    CanonicalDocument, ExtractedSample, RawSampleRecord, CONNECTOR_VERSION, SOURCE_NAME,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Format of the `ADDED` field
pub const ADDED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Output of [`Transformer::transform_batch`]
#[derive(Debug, Clone, Default)]
pub struct TransformOutput {
    pub documents: Vec<CanonicalDocument>,
    /// Identifiers of samples that had no usable SHA-256
    pub dropped: Vec<String>,
}

/// Stateless record transformer
#[derive(Debug, Clone, Default)]
pub struct Transformer {
    weights: CompletenessWeights,
}

impl Transformer {
    pub fn new(weights: CompletenessWeights) -> Self {
        Self { weights }
    }

    /// Transform one record, stamped with the current time
    pub fn transform(&self, raw: &RawSampleRecord) -> Option<CanonicalDocument> {
        self.transform_at(raw, Utc::now())
    }

    /// Transform one record, stamped with `now`
    pub fn transform_at(
        &self,
        raw: &RawSampleRecord,
        now: DateTime<Utc>,
    ) -> Option<CanonicalDocument> {
        let sha256 = normalize_hash(raw, "SHA256")?;
        let file_type = raw.text("F_TYPE").map(str::to_string);
        let added = raw.get("ADDED");

        Some(CanonicalDocument {
            sha256,
            md5: normalize_hash(raw, "MD5"),
            sha1: normalize_hash(raw, "SHA1"),
            ssdeep: raw.text("SSDEEP").map(str::to_string),
            sample_type: classify(file_type.as_deref()),
            file_type,
            sources: sources(raw),
            date_added: added.and_then(added_text),
            date_added_parsed: added.and_then(parse_added),
            data_completeness: self.weights.score(raw),
            ingestion_timestamp: now,
            source: SOURCE_NAME.to_string(),
            connector_version: CONNECTOR_VERSION.to_string(),
            raw_response: raw.clone(),
        })
    }

    /// Transform every sample with one shared ingestion timestamp
    pub fn transform_batch(&self, samples: &[ExtractedSample]) -> TransformOutput {
        let now = Utc::now();
        let mut output = TransformOutput::default();

        for sample in samples {
            match self.transform_at(&sample.record, now) {
                Some(document) => {
                    if document.date_added.is_some() && document.date_added_parsed.is_none() {
                        debug!(
                            sha256 = %document.sha256,
                            added = document.date_added.as_deref().unwrap_or_default(),
                            "Unparseable ADDED value, leaving date_added_parsed empty"
                        );
                    }
                    output.documents.push(document);
                },
                None => {
                    warn!(
                        identifier = %sample.identifier,
                        "Record has no SHA256, dropping"
                    );
                    output.dropped.push(sample.identifier.clone());
                },
            }
        }

        info!(
            transformed = output.documents.len(),
            dropped = output.dropped.len(),
            "Transformation complete"
        );
        output
    }
}

fn normalize_hash(raw: &RawSampleRecord, key: &str) -> Option<String> {
    raw.text(key).map(str::to_lowercase)
}

/// `SOURCES` as a list; a bare string is a single source
fn sources(raw: &RawSampleRecord) -> Vec<String> {
    match raw.get("SOURCES") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

fn added_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `ADDED` as `YYYY-MM-DD HH:MM:SS` in UTC, or integer epoch seconds
pub fn parse_added(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            NaiveDateTime::parse_from_str(s, ADDED_FORMAT)
                .map(|naive| naive.and_utc())
                .ok()
                .or_else(|| s.parse::<i64>().ok().and_then(from_epoch))
        },
        Value::Number(n) => n.as_i64().and_then(from_epoch),
        _ => None,
    }
}

fn from_epoch(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}
