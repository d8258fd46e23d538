//! Records flowing through the pipeline
//!
//! [`RawSampleRecord`] is whatever the API returned for a sample,
//! [`ExtractedSample`] pairs it with how much of it was fetched, and
//! [`CanonicalDocument`] is the normalized unit that gets persisted.

use chrono::{DateTime, Utc};
use malshare_common::fingerprint::fingerprint_json;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Value of [`CanonicalDocument::source`]
pub const SOURCE_NAME: &str = "malshare_api";

/// Value of [`CanonicalDocument::connector_version`]
pub const CONNECTOR_VERSION: &str = "1.0";

/// Unstructured sample metadata as returned by the API
///
/// Keys vary between records and between API versions, so lookups ignore
/// case. Any field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawSampleRecord(Map<String, Value>);

impl RawSampleRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// A record carrying nothing but the sample identifier
    pub fn from_identifier(sha256: &str) -> Self {
        let mut fields = Map::new();
        fields.insert("SHA256".to_string(), Value::String(sha256.to_string()));
        Self(fields)
    }

    /// `Some` only for JSON objects
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self(fields)),
            _ => None,
        }
    }

    /// Case-insensitive field lookup; an exact match wins
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).or_else(|| {
            self.0
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v)
        })
    }

    /// Trimmed string value, `None` if missing, not a string, or blank
    pub fn text(&self, key: &str) -> Option<&str> {
        self.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Whether `key` carries a usable value
    pub fn has_value(&self, key: &str) -> bool {
        match self.get(key) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(Value::Array(items)) => !items.is_empty(),
            Some(Value::Object(fields)) => !fields.is_empty(),
            Some(_) => true,
        }
    }

    /// Copy every field of `other` that this record lacks a value for
    ///
    /// Blank or null fields here are replaced, whatever their casing.
    pub fn fill_missing(&mut self, other: &RawSampleRecord) {
        for (key, value) in &other.0 {
            if self.has_value(key) {
                continue;
            }
            self.0.retain(|existing, _| !existing.eq_ignore_ascii_case(key));
            self.0.insert(key.clone(), value.clone());
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for RawSampleRecord {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

/// How much metadata the extractor obtained for a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enrichment {
    /// Details call succeeded
    Enriched,
    /// Details call failed or the entry had no hash to ask for; the record
    /// is the listing entry only
    Partial,
    /// Details were not requested
    ListingOnly,
}

/// One extracted sample, ready for transformation
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedSample {
    /// Identifier from the listing
    pub identifier: String,
    pub record: RawSampleRecord,
    pub enrichment: Enrichment,
}

/// Coarse sample category derived from the file-type string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleType {
    Executable,
    Document,
    Archive,
    Unknown,
}

impl SampleType {
    pub fn as_str(self) -> &'static str {
        match self {
            SampleType::Executable => "executable",
            SampleType::Document => "document",
            SampleType::Archive => "archive",
            SampleType::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for SampleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized, enriched sample metadata; the persisted unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalDocument {
    /// Lower-case hex, never empty for documents produced by the transformer
    pub sha256: String,
    pub md5: Option<String>,
    pub sha1: Option<String>,
    pub ssdeep: Option<String>,
    pub file_type: Option<String>,
    #[serde(default)]
    pub sources: Vec<String>,
    /// `ADDED` exactly as the API sent it
    pub date_added: Option<String>,
    pub date_added_parsed: Option<DateTime<Utc>>,
    pub sample_type: SampleType,
    /// Fraction of tracked fields present, in `[0, 1]`
    pub data_completeness: f64,
    pub ingestion_timestamp: DateTime<Utc>,
    pub source: String,
    pub connector_version: String,
    pub raw_response: RawSampleRecord,
}

impl CanonicalDocument {
    /// Hash of everything except `ingestion_timestamp`
    ///
    /// Two loads of the same sample with the same metadata have equal
    /// fingerprints.
    pub fn content_fingerprint(&self) -> malshare_common::Result<String> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(fields) = &mut value {
            fields.remove("ingestion_timestamp");
        }
        fingerprint_json(&value)
    }
}
