//! MalShare ETL Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Pulls recent malware-sample metadata from the MalShare API, normalizes it
//! into canonical documents and upserts them into a document collection.
//!
//! # Overview
//!
//! - **Client**: rate-limited API access with bounded exponential backoff
//! - **Extractor**: listing call plus per-sample details, tolerant of
//!   per-sample failures
//! - **Transformer**: hash normalization, date parsing, file-type
//!   classification and completeness scoring
//! - **Loader**: idempotent upserts keyed by SHA-256
//! - **Pipeline**: runs the stages in sequence and reports a run summary
//!
//! # Example
//!
//! ```no_run
//! use malshare_etl::config::ConnectorConfig;
//! use malshare_etl::pipeline::Pipeline;
//! use malshare_etl::store::MemoryCollection;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConnectorConfig::builder("my-api-key").sample_limit(10).build()?;
//!     let collection = Arc::new(MemoryCollection::new("malshare_raw"));
//!
//!     let mut pipeline = Pipeline::from_config(&config, collection)?;
//!     let summary = pipeline.run().await?;
//!     println!("loaded {} of {}", summary.loaded, summary.extracted);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod extractor;
pub mod loader;
pub mod models;
pub mod pipeline;
pub mod store;
pub mod transform;

pub use error::{PipelineError, Result};
