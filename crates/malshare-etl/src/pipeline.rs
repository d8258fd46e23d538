//! Extract → transform → load orchestration
//!
//! Stages run one after another on the full output of the previous stage.
//! Per-record problems are counted in the [`PipelineRunSummary`]; only a
//! source, store or configuration failure aborts the run.

use crate::client::{HttpTransport, RateLimitedClient, Transport};
use crate::config::ConnectorConfig;
use crate::error::{PipelineError, Result};
use crate::extractor::Extractor;
use crate::loader::Loader;
use crate::models::{Enrichment, ExtractedSample};
use crate::store::DocumentCollection;
use crate::transform::Transformer;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};
use uuid::Uuid;

/// Where a run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Extracting,
    Transforming,
    Loading,
    Done,
    Failed,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::Extracting => "extracting",
            PipelineState::Transforming => "transforming",
            PipelineState::Loading => "loading",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Counts for one completed run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRunSummary {
    pub run_id: Uuid,
    pub extracted: usize,
    /// Samples whose details call succeeded
    pub enriched: usize,
    /// Samples that kept only their listing entry after a details failure
    pub partially_enriched: usize,
    pub transformed: usize,
    /// Documents present in the store after the run
    pub loaded: usize,
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    /// Records dropped by the transformer plus documents the store rejected
    pub failed: usize,
    pub elapsed: Duration,
    pub state: PipelineState,
}

impl PipelineRunSummary {
    /// Share of extracted samples that ended up stored, in percent
    pub fn success_rate(&self) -> f64 {
        if self.extracted == 0 {
            return 0.0;
        }
        self.loaded as f64 / self.extracted as f64 * 100.0
    }
}

pub struct Pipeline<T = HttpTransport> {
    extractor: Extractor<T>,
    transformer: Transformer,
    loader: Loader,
    limit: usize,
    state: PipelineState,
}

impl Pipeline<HttpTransport> {
    /// HTTP-backed pipeline loading into `collection`
    pub fn from_config(
        config: &ConnectorConfig,
        collection: Arc<dyn DocumentCollection>,
    ) -> Result<Self> {
        config.validate()?;
        let client = RateLimitedClient::from_config(config)
            .map_err(|e| PipelineError::invalid_config(e.to_string()))?;

        Ok(Self::new(
            Extractor::new(client, config.fetch_details),
            Transformer::default(),
            Loader::new(collection),
            config.sample_limit,
        ))
    }
}

impl<T: Transport> Pipeline<T> {
    pub fn new(
        extractor: Extractor<T>,
        transformer: Transformer,
        loader: Loader,
        limit: usize,
    ) -> Self {
        Self {
            extractor,
            transformer,
            loader,
            limit,
            state: PipelineState::Idle,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Run all three stages once
    pub async fn run(&mut self) -> Result<PipelineRunSummary> {
        let run_id = Uuid::new_v4();
        let start_time = Instant::now();
        self.transition(PipelineState::Idle);

        info!(%run_id, limit = self.limit, "Starting MalShare ETL run");

        // Step 1: Extract
        self.transition(PipelineState::Extracting);
        let samples = match self.extractor.extract(self.limit).await {
            Ok(samples) => samples,
            Err(e) => return Err(self.fail(e)),
        };

        let enriched = count_with(&samples, Enrichment::Enriched);
        let partially_enriched = count_with(&samples, Enrichment::Partial);
        info!(
            %run_id,
            extracted = samples.len(),
            enriched,
            partially_enriched,
            "Extraction complete"
        );

        // Step 2: Transform
        self.transition(PipelineState::Transforming);
        let output = self.transformer.transform_batch(&samples);

        // Step 3: Load
        self.transition(PipelineState::Loading);
        if let Err(e) = self.loader.prepare().await {
            return Err(self.fail(e));
        }
        let report = match self.loader.load(&output.documents).await {
            Ok(report) => report,
            Err(e) => return Err(self.fail(e)),
        };

        self.transition(PipelineState::Done);

        let summary = PipelineRunSummary {
            run_id,
            extracted: samples.len(),
            enriched,
            partially_enriched,
            transformed: output.documents.len(),
            loaded: report.persisted(),
            inserted: report.inserted,
            updated: report.updated,
            skipped: report.skipped,
            failed: output.dropped.len() + report.failed,
            elapsed: start_time.elapsed(),
            state: self.state,
        };

        info!(
            %run_id,
            extracted = summary.extracted,
            transformed = summary.transformed,
            loaded = summary.loaded,
            inserted = summary.inserted,
            updated = summary.updated,
            skipped = summary.skipped,
            failed = summary.failed,
            "Run complete: {:.1}% success in {:.2}s",
            summary.success_rate(),
            summary.elapsed.as_secs_f64()
        );

        Ok(summary)
    }

    fn transition(&mut self, next: PipelineState) {
        debug!(from = %self.state, to = %next, "Pipeline state change");
        self.state = next;
    }

    fn fail(&mut self, err: PipelineError) -> PipelineError {
        error!(stage = %self.state, error = %err, "Pipeline run failed");
        self.transition(PipelineState::Failed);
        err
    }
}

fn count_with(samples: &[ExtractedSample], enrichment: Enrichment) -> usize {
    samples.iter().filter(|s| s.enrichment == enrichment).count()
}
