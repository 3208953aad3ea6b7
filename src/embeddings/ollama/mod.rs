
use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

use crate::config::Config;
use crate::embeddings::Embedder;

/// Client for an Ollama-compatible embedding endpoint.
///
/// Each call is a single blocking request bounded by the configured timeout;
/// there is no retry, a failure is reported to the caller as-is.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    url: Url,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Option<Vec<f32>>,
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &Config) -> Self {
        let timeout = config.ai.timeout();
        Self {
            url: config.ai.embedding_url.clone(),
            model: config.rag.embedding_model.clone(),
            api_key: config.ai.api_key.clone(),
            timeout,
            agent: build_agent(timeout),
        }
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self.agent = build_agent(timeout);
        self
    }

    #[inline]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Generate the embedding for a single text input
    #[inline]
    pub fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        debug!(
            "Generating embedding with model {} for text (length: {})",
            self.model,
            text.len()
        );

        let request = EmbedRequest {
            model: &self.model,
            prompt: text,
        };
        let request_json =
            serde_json::to_string(&request).context("Failed to serialize embedding request")?;

        let mut builder = self
            .agent
            .post(self.url.as_str())
            .header("Content-Type", "application/json");
        if let Some(api_key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let response_text = builder
            .send(&request_json)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| match e {
                ureq::Error::StatusCode(status) => {
                    anyhow!("Embedding API returned HTTP {}", status)
                }
                ureq::Error::Timeout(_) => anyhow!(
                    "Request to the embedding API timed out after {} seconds",
                    self.timeout.as_secs()
                ),
                other => anyhow!("Could not connect to the embedding API: {}", other),
            })?;

        let response: EmbedResponse = serde_json::from_str(&response_text)
            .context("Failed to parse embedding response")?;

        let Some(embedding) = response.embedding else {
            bail!("Embedding response is missing the `embedding` field");
        };
        if embedding.is_empty() {
            bail!("Embedding response contained an empty vector");
        }

        debug!("Generated embedding with {} dimensions", embedding.len());
        Ok(embedding)
    }
}

#[async_trait]
impl Embedder for OllamaClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        let client = self.clone();
        let text = text.to_owned();

        match tokio::task::spawn_blocking(move || client.generate_embedding(&text)).await {
            Ok(Ok(embedding)) => Some(embedding),
            Ok(Err(e)) => {
                warn!(
                    "Embedding request to {} with model {} failed: {:#}",
                    self.url, self.model, e
                );
                None
            }
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => {
                error!("Embedding worker did not complete: {}", e);
                None
            }
        }
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}
