//! MalShare ETL - malware sample metadata connector

use anyhow::Result;
use clap::Parser;
use malshare_common::logging::{init_logging, LogConfig, LogLevel};
use malshare_etl::config::ConnectorConfig;
use malshare_etl::error::PipelineError;
use malshare_etl::loader::LoadReport;
use malshare_etl::pipeline::Pipeline;
use malshare_etl::store::{DocumentCollection, MemoryCollection, PgCollection};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "malshare-etl")]
#[command(author, version, about = "Load MalShare sample metadata into a document store")]
struct Cli {
    /// Number of recent samples to process
    #[arg(short, long, env = "SAMPLE_LIMIT")]
    limit: Option<usize>,

    /// Use listing entries only, without per-sample details calls
    #[arg(long)]
    skip_details: bool,

    /// Load into an in-memory collection instead of the database
    #[arg(long)]
    dry_run: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    // .env may carry LOG_* settings as well as connector settings
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over flags
    let log_config = match LogConfig::builder().level(log_level).build().merge_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        },
    };

    let _log_guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        },
    };

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "MalShare ETL failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = ConnectorConfig::from_env()?;
    if let Some(limit) = cli.limit {
        config = config.with_sample_limit(limit)?;
    }
    if cli.skip_details {
        config.fetch_details = false;
    }

    info!(
        base_url = %config.base_url,
        limit = config.sample_limit,
        fetch_details = config.fetch_details,
        dry_run = cli.dry_run,
        "Configuration loaded"
    );

    let collection: Arc<dyn DocumentCollection> = if cli.dry_run {
        Arc::new(MemoryCollection::new(config.store.collection.clone()))
    } else {
        let collection = PgCollection::connect(&config.store).await.map_err(|source| {
            PipelineError::StoreUnavailable {
                committed: LoadReport::default(),
                source,
            }
        })?;
        Arc::new(collection)
    };

    let mut pipeline = Pipeline::from_config(&config, collection.clone())?;
    let summary = pipeline.run().await?;

    if summary.failed > 0 || summary.partially_enriched > 0 {
        warn!(
            failed = summary.failed,
            partially_enriched = summary.partially_enriched,
            "Run finished with per-record problems"
        );
    }

    match collection.stats().await {
        Ok(stats) => info!(
            collection = %collection.name(),
            total_documents = stats.total_documents,
            by_sample_type = ?stats.by_sample_type,
            latest_ingestion = ?stats.latest_ingestion,
            size_bytes = stats.size_bytes,
            "Collection statistics"
        ),
        Err(e) => warn!(error = %e, "Could not read collection statistics"),
    }

    Ok(())
}
