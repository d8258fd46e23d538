//! Idempotent loading into a document collection
//!
//! Documents are upserted one at a time, keyed by SHA-256, so re-running a
//! batch never creates duplicates. A rejected document is counted and
//! skipped. Losing the store aborts the batch, and the error carries what was
//! committed before that point.

use crate::error::{PipelineError, Result};
use crate::models::CanonicalDocument;
use crate::store::{DocumentCollection, UpsertOutcome, REQUIRED_INDEXES};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-batch load counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub inserted: usize,
    pub updated: usize,
    /// Already stored with identical content; timestamp refreshed
    pub skipped: usize,
    pub failed: usize,
}

impl LoadReport {
    /// Documents present in the store after the batch
    pub fn persisted(&self) -> usize {
        self.inserted + self.updated + self.skipped
    }

    fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Unchanged => self.skipped += 1,
        }
    }
}

pub struct Loader {
    collection: Arc<dyn DocumentCollection>,
}

impl Loader {
    pub fn new(collection: Arc<dyn DocumentCollection>) -> Self {
        Self { collection }
    }

    pub fn collection(&self) -> &Arc<dyn DocumentCollection> {
        &self.collection
    }

    /// Create the required indexes; safe to call repeatedly
    pub async fn prepare(&self) -> Result<()> {
        for index in REQUIRED_INDEXES {
            self.collection.ensure_index(index).await.map_err(|source| {
                PipelineError::StoreUnavailable {
                    committed: LoadReport::default(),
                    source,
                }
            })?;
        }
        debug!(collection = %self.collection.name(), "Indexes ready");
        Ok(())
    }

    /// Upsert every document, in order
    pub async fn load(&self, documents: &[CanonicalDocument]) -> Result<LoadReport> {
        let mut report = LoadReport::default();

        for document in documents {
            if document.sha256.trim().is_empty() {
                warn!("Document without sha256 reached the loader, not storing");
                report.failed += 1;
                continue;
            }

            match self.collection.upsert(&document.sha256, document).await {
                Ok(outcome) => {
                    debug!(sha256 = %document.sha256, ?outcome, "Stored document");
                    report.record(outcome);
                },
                Err(source) if source.is_unavailable() => {
                    warn!(
                        committed = report.persisted(),
                        error = %source,
                        "Document store became unavailable"
                    );
                    return Err(PipelineError::StoreUnavailable {
                        committed: report,
                        source,
                    });
                },
                Err(e) => {
                    warn!(sha256 = %document.sha256, error = %e, "Failed to store document");
                    report.failed += 1;
                },
            }
        }

        info!(
            collection = %self.collection.name(),
            inserted = report.inserted,
            updated = report.updated,
            skipped = report.skipped,
            failed = report.failed,
            "Load complete"
        );
        Ok(report)
    }
}
