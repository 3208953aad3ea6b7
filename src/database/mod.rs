// Database module
// Vector record storage and similarity search backed by PostgreSQL + pgvector

pub mod metric;
pub mod pgvector;

use async_trait::async_trait;

pub use metric::{DistanceMetric, SortOrder};
pub use pgvector::PgVectorStore;

use crate::Result;

/// A chunk ready to be written to the knowledge base
#[derive(Debug, Clone, PartialEq)]
pub struct NewVectorRecord {
    /// Title of the source document
    pub title: String,
    /// Chunk text
    pub content: String,
    pub embedding: Vec<f32>,
}

/// One row returned by a similarity search
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct SearchHit {
    pub title: String,
    pub content: String,
}

impl SearchHit {
    #[inline]
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }
}

/// How a similarity search ranks and filters rows
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchParams {
    pub metric: DistanceMetric,
    /// Keep only rows whose distance is below this value
    pub threshold: Option<f64>,
    pub limit: u32,
    pub inner_product_order: SortOrder,
}

impl Default for SearchParams {
    #[inline]
    fn default() -> Self {
        Self {
            metric: DistanceMetric::Cosine,
            threshold: None,
            limit: 5,
            inner_product_order: SortOrder::Ascending,
        }
    }
}

impl SearchParams {
    /// Whether rows are returned by descending operator value
    #[inline]
    pub fn descending(&self) -> bool {
        self.metric == DistanceMetric::InnerProduct
            && self.inner_product_order == SortOrder::Descending
    }
}

/// Table of `(title, content, embedding)` records with nearest-neighbour search.
///
/// The table has a single writer: `replace_all` clears and repopulates it
/// wholesale, there is no incremental update path.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the table if needed; the embedding dimension is fixed at creation
    async fn ensure_schema(&mut self, dimension: usize) -> Result<()>;

    /// Atomically replace every row with `records`, returning the rows written
    async fn replace_all(&mut self, records: &[NewVectorRecord]) -> Result<u64>;

    /// Nearest rows to `query`, closest first
    async fn search(&self, query: &[f32], params: &SearchParams) -> Result<Vec<SearchHit>>;

    async fn count(&self) -> Result<i64>;
}
