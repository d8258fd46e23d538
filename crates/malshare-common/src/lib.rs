//! MalShare ETL Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared utilities used by the MalShare ETL workspace members:
//!
//! - **Error Handling**: [`CommonError`] and the crate [`Result`] alias
//! - **Logging**: `tracing` subscriber setup driven by `LOG_*` variables
//! - **Fingerprints**: stable SHA-256 digests of JSON documents
//!
//! # Example
//!
//! ```no_run
//! use malshare_common::fingerprint::fingerprint_json;
//!
//! let digest = fingerprint_json(&serde_json::json!({"sha256": "e3b0"})).unwrap();
//! assert_eq!(digest.len(), 64);
//! ```

pub mod error;
pub mod fingerprint;
pub mod logging;

pub use error::{CommonError, Result};
