//! PostgreSQL-backed collection
//!
//! Each collection is a table inside a schema named after the configured
//! database. Documents live in a JSONB column next to the columns that are
//! indexed or needed for change detection:
//!
//! | column                | type        |
//! |-----------------------|-------------|
//! | `sha256`              | TEXT        |
//! | `document`            | JSONB       |
//! | `ingestion_timestamp` | TIMESTAMPTZ |
//! | `sample_type`         | TEXT        |
//! | `fingerprint`         | TEXT        |
//!
//! Schema and table names are validated identifiers, so they are safe to
//! interpolate into statements.

use super::{
    is_valid_identifier, CollectionStats, DocumentCollection, IndexSpec, UpsertOutcome,
};
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::models::CanonicalDocument;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{debug, info};

/// Pool size; the pipeline issues one statement at a time
const MAX_CONNECTIONS: u32 = 2;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct PgCollection {
    pool: PgPool,
    schema: String,
    table: String,
}

impl PgCollection {
    /// Connect and create the schema and table if missing
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        info!(
            url = %config.redacted_url(),
            database = %config.database,
            collection = %config.collection,
            "Connecting to document store"
        );

        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(&config.url)
            .await?;

        let collection = Self::with_pool(pool, &config.database, &config.collection)?;
        collection.create_if_missing().await?;
        Ok(collection)
    }

    /// Wrap an existing pool; no statements are issued
    pub fn with_pool(pool: PgPool, schema: &str, table: &str) -> Result<Self, StoreError> {
        for name in [schema, table] {
            if !is_valid_identifier(name) {
                return Err(StoreError::Rejected(format!(
                    "'{}' is not a valid schema or table name",
                    name
                )));
            }
        }

        Ok(Self {
            pool,
            schema: schema.to_string(),
            table: table.to_string(),
        })
    }

    async fn create_if_missing(&self) -> Result<(), StoreError> {
        sqlx::query(&create_schema_sql(&self.schema))
            .execute(&self.pool)
            .await?;
        sqlx::query(&create_table_sql(&self.qualified()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn qualified(&self) -> String {
        qualified_name(&self.schema, &self.table)
    }
}

#[async_trait]
impl DocumentCollection for PgCollection {
    fn name(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }

    async fn ensure_index(&self, index: IndexSpec) -> Result<(), StoreError> {
        let sql = create_index_sql(&self.table, &self.qualified(), index);
        debug!(field = index.field.as_str(), unique = index.unique, "Ensuring index");
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn upsert(
        &self,
        key: &str,
        document: &CanonicalDocument,
    ) -> Result<UpsertOutcome, StoreError> {
        let fingerprint = document.content_fingerprint()?;

        let previous: Option<String> = sqlx::query_scalar(&upsert_sql(&self.qualified()))
            .bind(key)
            .bind(Json(document))
            .bind(document.ingestion_timestamp)
            .bind(document.sample_type.as_str())
            .bind(&fingerprint)
            .fetch_one(&self.pool)
            .await?;

        Ok(match previous {
            None => UpsertOutcome::Inserted,
            Some(prev) if prev == fingerprint => UpsertOutcome::Unchanged,
            Some(_) => UpsertOutcome::Updated,
        })
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar(&count_sql(&self.qualified()))
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn stats(&self) -> Result<CollectionStats, StoreError> {
        let qualified = self.qualified();

        let groups: Vec<(String, i64)> = sqlx::query_as(&sample_type_counts_sql(&qualified))
            .fetch_all(&self.pool)
            .await?;

        let latest_ingestion: Option<DateTime<Utc>> =
            sqlx::query_scalar(&latest_ingestion_sql(&qualified))
                .fetch_one(&self.pool)
                .await?;

        let size_bytes: i64 = sqlx::query_scalar(relation_size_sql())
            .bind(qualified.as_str())
            .fetch_one(&self.pool)
            .await?;

        let by_sample_type: std::collections::BTreeMap<String, u64> = groups
            .into_iter()
            .map(|(sample_type, count)| (sample_type, count.max(0) as u64))
            .collect();

        Ok(CollectionStats {
            total_documents: by_sample_type.values().sum(),
            by_sample_type,
            latest_ingestion,
            size_bytes: size_bytes.max(0) as u64,
        })
    }
}

// ============================================================================
// Statement builders
// ============================================================================

fn qualified_name(schema: &str, table: &str) -> String {
    format!("\"{}\".\"{}\"", schema, table)
}

fn create_schema_sql(schema: &str) -> String {
    format!("CREATE SCHEMA IF NOT EXISTS \"{}\"", schema)
}

fn create_table_sql(qualified: &str) -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            sha256 TEXT NOT NULL,
            document JSONB NOT NULL,
            ingestion_timestamp TIMESTAMPTZ NOT NULL,
            sample_type TEXT NOT NULL,
            fingerprint TEXT NOT NULL
        )
        "#,
        qualified
    )
}

fn create_index_sql(table: &str, qualified: &str, index: IndexSpec) -> String {
    let field = index.field.as_str();
    format!(
        "CREATE {}INDEX IF NOT EXISTS \"{}_{}_idx\" ON {} ({})",
        if index.unique { "UNIQUE " } else { "" },
        table,
        field,
        qualified,
        field
    )
}

/// Upsert returning the fingerprint stored before the statement ran, NULL
/// for a new key
fn upsert_sql(qualified: &str) -> String {
    format!(
        r#"
        WITH previous AS (
            SELECT fingerprint FROM {table} WHERE sha256 = $1
        ), upserted AS (
            INSERT INTO {table} (sha256, document, ingestion_timestamp, sample_type, fingerprint)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (sha256) DO UPDATE SET
                document = EXCLUDED.document,
                ingestion_timestamp = EXCLUDED.ingestion_timestamp,
                sample_type = EXCLUDED.sample_type,
                fingerprint = EXCLUDED.fingerprint
        )
        SELECT (SELECT fingerprint FROM previous) AS previous_fingerprint
        "#,
        table = qualified
    )
}

fn count_sql(qualified: &str) -> String {
    format!("SELECT COUNT(*) FROM {}", qualified)
}

fn sample_type_counts_sql(qualified: &str) -> String {
    format!(
        "SELECT sample_type, COUNT(*) FROM {} GROUP BY sample_type ORDER BY sample_type",
        qualified
    )
}

fn latest_ingestion_sql(qualified: &str) -> String {
    format!("SELECT MAX(ingestion_timestamp) FROM {}", qualified)
}

/// Table plus indexes and TOAST; binds the qualified name as `$1`
fn relation_size_sql() -> &'static str {
    "SELECT pg_total_relation_size($1::regclass)"
}
