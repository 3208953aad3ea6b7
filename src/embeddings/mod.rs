// Embeddings module
// Token-window chunking and the embedding service client

pub mod chunking;
pub mod ollama;

use async_trait::async_trait;

pub use chunking::{Chunker, ChunkingConfig, chunk_text};
pub use ollama::OllamaClient;

/// Turns text into a fixed-length vector.
///
/// A failed call yields `None`; callers decide whether that is fatal
/// (dimension probe), skippable (one chunk during ingestion) or a reason to
/// drop retrieval entirely.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier sent with every request
    fn model(&self) -> &str;

    async fn embed(&self, text: &str) -> Option<Vec<f32>>;
}
