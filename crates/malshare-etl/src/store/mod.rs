//! Document collections
//!
//! A [`DocumentCollection`] stores [`CanonicalDocument`]s keyed by SHA-256.
//! Upserts report whether the key was new, whose content changed, or whose
//! content was identical apart from the ingestion timestamp.

pub mod memory;
pub mod postgres;

pub use memory::MemoryCollection;
pub use postgres::PgCollection;

use crate::error::StoreError;
use crate::models::CanonicalDocument;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Longest identifier PostgreSQL accepts without truncation
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Whether `name` is usable as an unquoted schema or table name
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');

    valid_start
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name.len() <= MAX_IDENTIFIER_LEN
}

/// Document field that can be indexed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexedField {
    Sha256,
    IngestionTimestamp,
    SampleType,
}

impl IndexedField {
    pub fn as_str(self) -> &'static str {
        match self {
            IndexedField::Sha256 => "sha256",
            IndexedField::IngestionTimestamp => "ingestion_timestamp",
            IndexedField::SampleType => "sample_type",
        }
    }
}

/// Index to create on a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexSpec {
    pub field: IndexedField,
    pub unique: bool,
}

/// Indexes every collection needs before loading
pub const REQUIRED_INDEXES: [IndexSpec; 3] = [
    IndexSpec {
        field: IndexedField::Sha256,
        unique: true,
    },
    IndexSpec {
        field: IndexedField::IngestionTimestamp,
        unique: false,
    },
    IndexSpec {
        field: IndexedField::SampleType,
        unique: false,
    },
];

/// What an upsert did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The key was new
    Inserted,
    /// The stored content differed
    Updated,
    /// Only the ingestion timestamp was refreshed
    Unchanged,
}

/// Collection summary reported after a run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CollectionStats {
    pub total_documents: u64,
    pub by_sample_type: BTreeMap<String, u64>,
    pub latest_ingestion: Option<DateTime<Utc>>,
    /// Storage footprint in bytes, as the backend measures it
    pub size_bytes: u64,
}

/// Keyed document storage
#[async_trait]
pub trait DocumentCollection: Send + Sync {
    /// Qualified collection name, for logs
    fn name(&self) -> String;

    /// Create `index` if it does not exist
    async fn ensure_index(&self, index: IndexSpec) -> Result<(), StoreError>;

    /// Insert or replace the document stored under `key`
    async fn upsert(
        &self,
        key: &str,
        document: &CanonicalDocument,
    ) -> Result<UpsertOutcome, StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;

    async fn stats(&self) -> Result<CollectionStats, StoreError>;
}
