
use async_trait::async_trait;
use itertools::Itertools;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{NewVectorRecord, SearchHit, SearchParams, VectorStore};
use crate::config::{Config, settings::is_valid_identifier};
use crate::{AidbaError, Result};

/// Rows per multi-row INSERT; three bind parameters each, well under the
/// PostgreSQL limit of 65535 parameters per statement
const INSERT_BATCH_SIZE: usize = 1000;

/// pgvector-backed knowledge base table
pub struct PgVectorStore {
    pool: PgPool,
    table_name: String,
    dimension: Option<usize>,
}

impl PgVectorStore {
    /// Open a single store connection
    ///
    /// # Arguments
    /// * `connection_string` - PostgreSQL connection URL
    /// * `table_name` - Destination table, must be a plain SQL identifier
    /// * `timeout` - Upper bound on establishing the connection
    #[inline]
    pub async fn connect(
        connection_string: &str,
        table_name: &str,
        timeout: Duration,
    ) -> Result<Self> {
        if !is_valid_identifier(table_name) {
            return Err(AidbaError::Config(format!(
                "Invalid table name: {table_name:?}"
            )));
        }

        debug!("Connecting to the knowledge base database");

        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(timeout)
            .connect(connection_string)
            .await
            .map_err(|e| {
                AidbaError::Database(format!("Could not connect to the database: {}", e))
            })?;

        Ok(Self {
            pool,
            table_name: table_name.to_string(),
            dimension: None,
        })
    }

    /// Connect using the `[rag]` section of the configuration
    #[inline]
    pub async fn from_config(config: &Config) -> Result<Self> {
        let connection_string = config.rag.require_connection_string()?;
        Self::connect(connection_string, &config.rag.table_name, config.ai.timeout()).await
    }

    #[inline]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Embedding dimension of the existing table, if the table exists
    #[inline]
    pub async fn existing_dimension(&self) -> Result<Option<usize>> {
        let typmod: Option<i32> = sqlx::query_scalar(
            r#"
            SELECT a.atttypmod
            FROM pg_attribute a
            JOIN pg_class c ON c.oid = a.attrelid
            WHERE c.relname = $1
              AND pg_table_is_visible(c.oid)
              AND a.attname = 'embedding'
              AND NOT a.attisdropped
            "#,
        )
        // unquoted identifiers are folded to lower case
        .bind(self.table_name.to_ascii_lowercase())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AidbaError::Database(format!("Failed to inspect table schema: {}", e)))?;

        Ok(typmod
            .filter(|dim| *dim > 0)
            .and_then(|dim| usize::try_from(dim).ok()))
    }

    #[inline]
    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn ensure_schema(&mut self, dimension: usize) -> Result<()> {
        info!("Enabling pgvector extension");
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AidbaError::Database(format!("Failed to enable pgvector extension: {}", e))
            })?;

        info!("Creating table '{}' if it doesn't exist", self.table_name);
        let create_table = create_table_sql(&self.table_name, dimension);
        debug!("Executing SQL: {}", create_table);
        sqlx::query(&create_table)
            .execute(&self.pool)
            .await
            .map_err(|e| AidbaError::Database(format!("Failed to create table: {}", e)))?;

        if let Some(existing) = self.existing_dimension().await? {
            if existing != dimension {
                return Err(AidbaError::Database(format!(
                    "Table '{}' stores {}-dimensional embeddings but the model produces {}; \
                     drop the table to switch embedding models",
                    self.table_name, existing, dimension
                )));
            }
        } else {
            warn!(
                "Could not read the embedding dimension of '{}'",
                self.table_name
            );
        }

        self.dimension = Some(dimension);
        Ok(())
    }

    async fn replace_all(&mut self, records: &[NewVectorRecord]) -> Result<u64> {
        let dimension = self.dimension.ok_or_else(|| {
            AidbaError::Database("Schema must be ensured before writing records".to_string())
        })?;

        if let Some(bad) = records.iter().find(|r| r.embedding.len() != dimension) {
            return Err(AidbaError::Database(format!(
                "Embedding dimension mismatch for '{}': expected {}, got {}",
                bad.title,
                dimension,
                bad.embedding.len()
            )));
        }

        // Dropping the transaction on any early return rolls it back
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AidbaError::Database(format!("Failed to begin transaction: {}", e)))?;

        let locked: bool = sqlx::query_scalar("SELECT pg_try_advisory_xact_lock(hashtext($1))")
            .bind(&self.table_name)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| AidbaError::Database(format!("Failed to take the write lock: {}", e)))?;
        if !locked {
            return Err(AidbaError::Database(format!(
                "Another ingestion run is writing to '{}'",
                self.table_name
            )));
        }

        info!("Clearing existing data from '{}'", self.table_name);
        sqlx::query(&format!("TRUNCATE TABLE {}", self.table_name))
            .execute(&mut *tx)
            .await
            .map_err(|e| AidbaError::Database(format!("Failed to truncate table: {}", e)))?;

        for batch in records.chunks(INSERT_BATCH_SIZE) {
            let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(format!(
                "INSERT INTO {} (title, content, embedding) ",
                self.table_name
            ));
            builder.push_values(batch, |mut row, record| {
                row.push_bind(&record.title)
                    .push_bind(&record.content)
                    .push_bind(vector_literal(&record.embedding))
                    .push_unseparated("::vector");
            });

            builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(|e| AidbaError::Database(format!("Failed to insert records: {}", e)))?;

            debug!("Inserted batch of {} records", batch.len());
        }

        tx.commit()
            .await
            .map_err(|e| AidbaError::Database(format!("Failed to commit records: {}", e)))?;

        Ok(records.len() as u64)
    }

    async fn search(&self, query: &[f32], params: &SearchParams) -> Result<Vec<SearchHit>> {
        let sql = build_search_sql(&self.table_name, params);
        debug!("RAG SQL query: {}", sql);
        debug!(
            "RAG SQL params: threshold={:?}, limit={}",
            params.threshold, params.limit
        );

        let mut query_builder = sqlx::query_as::<_, SearchHit>(&sql).bind(vector_literal(query));
        if let Some(threshold) = params.threshold {
            query_builder = query_builder.bind(threshold);
        }

        let hits = query_builder
            .bind(i64::from(params.limit))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AidbaError::Database(format!("Similarity search failed: {}", e)))?;

        debug!("Similarity search returned {} rows", hits.len());
        Ok(hits)
    }

    async fn count(&self) -> Result<i64> {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", self.table_name))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AidbaError::Database(format!("Failed to count records: {}", e)))
    }
}

pub(crate) fn create_table_sql(table_name: &str, dimension: usize) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table_name} (\
         id SERIAL PRIMARY KEY, \
         title TEXT, \
         content TEXT, \
         embedding VECTOR({dimension}))"
    )
}

/// Similarity query for `params`.
///
/// Binds: `$1` query vector literal, then the threshold when present, then
/// the row limit.
pub(crate) fn build_search_sql(table_name: &str, params: &SearchParams) -> String {
    let op = params.metric.operator();
    let direction = if params.descending() { " DESC" } else { "" };
    let select = format!(
        "SELECT COALESCE(title, '') AS title, COALESCE(content, '') AS content FROM {table_name}"
    );

    if params.threshold.is_some() {
        format!(
            "{select} WHERE (embedding {op} $1::vector) < $2 \
             ORDER BY embedding {op} $1::vector{direction} LIMIT $3"
        )
    } else {
        format!("{select} ORDER BY embedding {op} $1::vector{direction} LIMIT $2")
    }
}

/// pgvector text representation, e.g. `[0.5,-1,2.25]`
pub(crate) fn vector_literal(values: &[f32]) -> String {
    format!("[{}]", values.iter().join(","))
}
