//! In-process collection, used for dry runs and tests

use super::{CollectionStats, DocumentCollection, IndexSpec, UpsertOutcome};
use crate::error::StoreError;
use crate::models::CanonicalDocument;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct StoredDocument {
    document: CanonicalDocument,
    fingerprint: String,
    /// Serialized JSON length
    size: u64,
}

#[derive(Debug, Default)]
pub struct MemoryCollection {
    name: String,
    documents: RwLock<BTreeMap<String, StoredDocument>>,
    indexes: RwLock<HashSet<IndexSpec>>,
}

impl MemoryCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub async fn get(&self, key: &str) -> Option<CanonicalDocument> {
        self.documents
            .read()
            .await
            .get(key)
            .map(|stored| stored.document.clone())
    }

    /// All stored documents, ordered by key
    pub async fn documents(&self) -> Vec<CanonicalDocument> {
        self.documents
            .read()
            .await
            .values()
            .map(|stored| stored.document.clone())
            .collect()
    }

    pub async fn has_index(&self, index: &IndexSpec) -> bool {
        self.indexes.read().await.contains(index)
    }
}

#[async_trait]
impl DocumentCollection for MemoryCollection {
    fn name(&self) -> String {
        format!("memory:{}", self.name)
    }

    async fn ensure_index(&self, index: IndexSpec) -> Result<(), StoreError> {
        self.indexes.write().await.insert(index);
        Ok(())
    }

    async fn upsert(
        &self,
        key: &str,
        document: &CanonicalDocument,
    ) -> Result<UpsertOutcome, StoreError> {
        let fingerprint = document.content_fingerprint()?;
        let size = serde_json::to_vec(document)?.len() as u64;
        let stored = StoredDocument {
            document: document.clone(),
            fingerprint,
            size,
        };

        let previous = self.documents.write().await.insert(key.to_string(), stored.clone());

        Ok(match previous {
            None => UpsertOutcome::Inserted,
            Some(prev) if prev.fingerprint == stored.fingerprint => UpsertOutcome::Unchanged,
            Some(_) => UpsertOutcome::Updated,
        })
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.documents.read().await.len() as u64)
    }

    async fn stats(&self) -> Result<CollectionStats, StoreError> {
        let documents = self.documents.read().await;
        let mut stats = CollectionStats {
            total_documents: documents.len() as u64,
            ..CollectionStats::default()
        };

        for stored in documents.values() {
            stats.size_bytes += stored.size;
            let doc = &stored.document;
            *stats
                .by_sample_type
                .entry(doc.sample_type.to_string())
                .or_default() += 1;
            if stats
                .latest_ingestion
                .is_none_or(|latest| doc.ingestion_timestamp > latest)
            {
                stats.latest_ingestion = Some(doc.ingestion_timestamp);
            }
        }

        Ok(stats)
    }
}
