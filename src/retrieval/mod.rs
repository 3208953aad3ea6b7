// Retrieval module
// Snapshot -> search string -> query embedding -> similarity search -> context block

pub mod context;
pub mod query;


use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::database::{PgVectorStore, SearchParams, VectorStore};
use crate::embeddings::{Embedder, OllamaClient};
use crate::{AidbaError, Result};

pub use context::render_context;
pub use query::compose_query;

/// Source of grounding context for a report.
///
/// Never fails: any problem degrades to an empty context.
#[async_trait]
pub trait RagProvider: Send + Sync {
    async fn context(&self, snapshot: &Value) -> String;
}

/// Used when no knowledge base is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRag;

#[async_trait]
impl RagProvider for NoopRag {
    async fn context(&self, _snapshot: &Value) -> String {
        info!("RAG not configured, skipping RAG context");
        String::new()
    }
}

/// Embeds a search string and renders the nearest records
pub struct Retriever<E> {
    embedder: E,
    params: SearchParams,
}

impl<E: Embedder> Retriever<E> {
    #[inline]
    pub fn new(embedder: E, params: SearchParams) -> Self {
        Self { embedder, params }
    }

    #[inline]
    pub fn params(&self) -> &SearchParams {
        &self.params
    }

    /// Context block for `snapshot`, or an empty string when nothing matches
    #[inline]
    pub async fn retrieve(&self, store: &dyn VectorStore, snapshot: &Value) -> Result<String> {
        let query = compose_query(snapshot);
        self.retrieve_for_query(store, &query).await
    }

    #[inline]
    pub async fn retrieve_for_query(&self, store: &dyn VectorStore, query: &str) -> Result<String> {
        if query.trim().is_empty() {
            info!("No relevant information to build a RAG query, skipping");
            return Ok(String::new());
        }

        let embedding = self.embedder.embed(query).await.ok_or_else(|| {
            AidbaError::Embedding(format!(
                "Could not embed the search query with model '{}'",
                self.embedder.model()
            ))
        })?;

        let hits = store.search(&embedding, &self.params).await?;
        debug!("RAG query results: {:?}", hits);

        Ok(render_context(&hits))
    }
}

/// Knowledge base backed by a pgvector table; connects once per request
pub struct PgRag {
    connection_string: String,
    table_name: String,
    timeout: Duration,
    retriever: Retriever<OllamaClient>,
}

impl PgRag {
    /// # Errors
    /// Fails when no connection string is configured
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let connection_string = config.rag.require_connection_string()?.to_string();
        Ok(Self {
            connection_string,
            table_name: config.rag.table_name.clone(),
            timeout: config.ai.timeout(),
            retriever: Retriever::new(OllamaClient::new(config), config.rag.search_params()),
        })
    }

    async fn try_context(&self, snapshot: &Value) -> Result<String> {
        let query = compose_query(snapshot);
        info!("RAG search query: {}", query);
        if query.trim().is_empty() {
            return Ok(String::new());
        }

        let store =
            PgVectorStore::connect(&self.connection_string, &self.table_name, self.timeout).await?;
        let result = self.retriever.retrieve_for_query(&store, &query).await;
        store.close().await;
        result
    }
}

#[async_trait]
impl RagProvider for PgRag {
    async fn context(&self, snapshot: &Value) -> String {
        info!("Retrieving RAG context");
        match self.try_context(snapshot).await {
            Ok(context) if context.is_empty() => {
                info!("No matching knowledge base articles");
                context
            }
            Ok(context) => {
                info!("Successfully retrieved RAG context");
                context
            }
            Err(e) => {
                warn!(
                    "Failed to retrieve RAG context, proceeding without it: {}",
                    e
                );
                String::new()
            }
        }
    }
}

/// Pick the context source once, from whether a knowledge base is configured
#[inline]
pub fn rag_provider(config: &Config) -> Box<dyn RagProvider> {
    match PgRag::new(config) {
        Ok(rag) => Box::new(rag),
        Err(_) => Box::new(NoopRag),
    }
}
