// Indexer module
// Rebuilds the knowledge base table from the reference documents

pub mod documents;


use std::path::PathBuf;

use futures::{StreamExt, stream};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use crate::config::{ConfigError, RagConfig};
use crate::database::{NewVectorRecord, VectorStore};
use crate::embeddings::{Chunker, ChunkingConfig, Embedder};
use crate::{AidbaError, Result};

pub use documents::{ReferenceDocument, load_documents};

/// Text embedded once per run to learn the model's vector dimension
const DIMENSION_PROBE: &str = "dimension probe";

/// Outcome of one ingestion run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestionReport {
    pub documents: usize,
    pub chunks: usize,
    pub inserted: u64,
    /// Chunks dropped because their embedding failed
    pub skipped: usize,
}

/// One-shot ingestion: documents -> chunks -> embeddings -> full table rebuild
pub struct Indexer<E, S> {
    embedder: E,
    store: S,
    chunking: ChunkingConfig,
    source_dir: PathBuf,
    concurrency: usize,
}

impl<E: Embedder, S: VectorStore> Indexer<E, S> {
    #[inline]
    pub fn new(embedder: E, store: S, config: &RagConfig) -> Self {
        Self {
            embedder,
            store,
            chunking: config.chunking(),
            source_dir: config.source_dir.clone(),
            concurrency: config.embedding_concurrency,
        }
    }

    #[inline]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[inline]
    pub fn into_store(self) -> S {
        self.store
    }

    /// Run every ingestion stage once.
    ///
    /// Failed chunk embeddings are skipped and counted. Anything else aborts
    /// the run before the table is touched, except a failed final write,
    /// which is rolled back by the store.
    #[inline]
    pub async fn run(&mut self) -> Result<IngestionReport> {
        info!("--- Starting RAG knowledge base loading ---");

        // a zero-width buffer never polls its futures
        if self.concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency(self.concurrency).into());
        }

        let chunker = Chunker::new(self.chunking.clone())
            .map_err(|e| AidbaError::Config(format!("{:#}", e)))?;

        let dimension = self.probe_dimension().await?;
        self.store.ensure_schema(dimension).await?;

        let documents = load_documents(&self.source_dir).await?;
        let pending = chunk_documents(&chunker, &documents);
        if pending.is_empty() {
            warn!("No text chunks to process, the knowledge base will be empty");
        } else {
            info!("Total chunks to process: {}", pending.len());
        }

        let chunks = pending.len();
        let records = self.embed_chunks(pending).await;
        let skipped = chunks - records.len();
        if skipped > 0 {
            warn!("Skipped {} chunks whose embedding failed", skipped);
        }

        info!("Inserting {} records into the knowledge base", records.len());
        let inserted = self.store.replace_all(&records).await?;

        let report = IngestionReport {
            documents: documents.len(),
            chunks,
            inserted,
            skipped,
        };
        info!(
            "--- Successfully loaded {} chunks from {} documents into the knowledge base ---",
            report.inserted, report.documents
        );
        Ok(report)
    }

    async fn probe_dimension(&self) -> Result<usize> {
        info!(
            "Probing embedding dimension with model '{}'",
            self.embedder.model()
        );
        let probe = self.embedder.embed(DIMENSION_PROBE).await.ok_or_else(|| {
            AidbaError::Embedding(format!(
                "Could not determine the embedding dimension of model '{}'",
                self.embedder.model()
            ))
        })?;

        debug!("Embedding dimension is {}", probe.len());
        Ok(probe.len())
    }

    /// Embed chunks with bounded concurrency, keeping input order
    async fn embed_chunks(&self, pending: Vec<(String, String)>) -> Vec<NewVectorRecord> {
        info!(
            "Generating embeddings using model '{}'",
            self.embedder.model()
        );

        let bar = progress_bar(pending.len());
        let bar = &bar;
        let embedder = &self.embedder;

        let records: Vec<NewVectorRecord> = stream::iter(pending)
            .map(|(title, content)| async move {
                let embedding = embedder.embed(&content).await;
                bar.inc(1);
                match embedding {
                    Some(embedding) => Some(NewVectorRecord {
                        title,
                        content,
                        embedding,
                    }),
                    None => {
                        debug!("No embedding for a chunk of '{}'", title);
                        None
                    }
                }
            })
            .buffered(self.concurrency)
            .filter_map(|record| async move { record })
            .collect()
            .await;

        bar.finish_and_clear();
        records
    }
}

/// `(title, chunk)` pairs for every document, in document order
fn chunk_documents(chunker: &Chunker, documents: &[ReferenceDocument]) -> Vec<(String, String)> {
    documents
        .iter()
        .flat_map(|doc| {
            let chunks = chunker.chunk(&doc.body);
            debug!("{} -> {} chunks", doc.path.display(), chunks.len());
            chunks.into_iter().map(|chunk| (doc.title.clone(), chunk))
        })
        .collect()
}

fn progress_bar(len: usize) -> ProgressBar {
    if console::user_attended_stderr() {
        ProgressBar::new(len as u64).with_style(
            ProgressStyle::with_template("{bar:40} [{pos}/{len}] Embedding chunks")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        )
    } else {
        ProgressBar::hidden()
    }
}
