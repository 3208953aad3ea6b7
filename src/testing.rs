// Test doubles for the embedding service and the vector store

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::database::{
    DistanceMetric, NewVectorRecord, SearchHit, SearchParams, VectorStore,
};
use crate::embeddings::Embedder;
use crate::{AidbaError, Result};

/// Embedder returning deterministic vectors without any network access
pub(crate) struct MockEmbedder {
    dimension: usize,
    fixed: HashMap<String, Vec<f32>>,
    fail_on: Vec<String>,
    fail_all: bool,
    calls: AtomicUsize,
}

impl MockEmbedder {
    pub(crate) fn new(dimension: usize) -> Self {
        Self {
            dimension,
            fixed: HashMap::new(),
            fail_on: Vec::new(),
            fail_all: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Return `vector` for exactly `text`
    pub(crate) fn with_vector(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.fixed.insert(text.to_string(), vector);
        self
    }

    /// Fail every text containing `needle`
    pub(crate) fn failing_on(mut self, needle: &str) -> Self {
        self.fail_on.push(needle.to_string());
        self
    }

    pub(crate) fn failing(mut self) -> Self {
        self.fail_all = true;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    fn model(&self) -> &str {
        "mock-embed"
    }

    async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_all || self.fail_on.iter().any(|needle| text.contains(needle)) {
            return None;
        }

        if let Some(vector) = self.fixed.get(text) {
            return Some(vector.clone());
        }

        // Spread the bytes over the dimensions so different texts differ
        let mut vector = vec![0.0f32; self.dimension];
        for (i, byte) in text.bytes().enumerate() {
            vector[i % self.dimension] += f32::from(byte) / 255.0;
        }
        vector[0] += 1.0;
        Some(vector)
    }
}

/// In-memory store that ranks rows the way pgvector's operators do
#[derive(Default)]
pub(crate) struct MemoryStore {
    pub(crate) dimension: Option<usize>,
    pub(crate) records: Vec<NewVectorRecord>,
    pub(crate) replace_calls: usize,
    pub(crate) fail_search: bool,
}

impl MemoryStore {
    pub(crate) fn with_records(dimension: usize, records: Vec<NewVectorRecord>) -> Self {
        Self {
            dimension: Some(dimension),
            records,
            ..Self::default()
        }
    }
}

/// Operator value pgvector computes for `metric`: `<=>`, `<->` or `<#>`
pub(crate) fn operator_value(metric: DistanceMetric, a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
    match metric {
        DistanceMetric::Cosine => {
            let norm = |v: &[f32]| v.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
            1.0 - dot / (norm(a) * norm(b))
        }
        DistanceMetric::Euclidean => a
            .iter()
            .zip(b)
            .map(|(x, y)| (f64::from(*x) - f64::from(*y)).powi(2))
            .sum::<f64>()
            .sqrt(),
        DistanceMetric::InnerProduct => -dot,
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn ensure_schema(&mut self, dimension: usize) -> Result<()> {
        match self.dimension {
            Some(existing) if existing != dimension => Err(AidbaError::Database(format!(
                "Table stores {}-dimensional embeddings but the model produces {}",
                existing, dimension
            ))),
            _ => {
                self.dimension = Some(dimension);
                Ok(())
            }
        }
    }

    async fn replace_all(&mut self, records: &[NewVectorRecord]) -> Result<u64> {
        let dimension = self
            .dimension
            .ok_or_else(|| AidbaError::Database("Schema not ensured".to_string()))?;
        if records.iter().any(|r| r.embedding.len() != dimension) {
            return Err(AidbaError::Database("Embedding dimension mismatch".to_string()));
        }

        self.replace_calls += 1;
        self.records = records.to_vec();
        Ok(records.len() as u64)
    }

    async fn search(&self, query: &[f32], params: &SearchParams) -> Result<Vec<SearchHit>> {
        if self.fail_search {
            return Err(AidbaError::Database("Similarity search failed".to_string()));
        }

        let mut scored: Vec<(f64, &NewVectorRecord)> = self
            .records
            .iter()
            .map(|record| (operator_value(params.metric, &record.embedding, query), record))
            .filter(|(value, _)| params.threshold.is_none_or(|threshold| *value < threshold))
            .collect();

        scored.sort_by(|a, b| a.0.total_cmp(&b.0));
        if params.descending() {
            scored.reverse();
        }

        Ok(scored
            .into_iter()
            .take(params.limit as usize)
            .map(|(_, record)| SearchHit::new(&record.title, &record.content))
            .collect())
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.records.len() as i64)
    }
}
