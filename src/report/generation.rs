// Text-generation client for an Ollama-compatible /api/generate endpoint


use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::config::Config;
use crate::{AidbaError, Result};

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("The request to the AI API timed out after {0} seconds.")]
    Timeout(u64),
    #[error("AI API at {url} returned HTTP {status}.")]
    Status { url: String, status: u16 },
    #[error(
        "Could not connect to AI API at {url}. Please ensure the endpoint is correct \
         and the service is running. Details: {details}"
    )]
    Connection { url: String, details: String },
    #[error("Failed to decode JSON response from the AI API.")]
    Decode,
    #[error("Failed to encode the generation request: {0}")]
    Encode(String),
}

impl From<GenerationError> for AidbaError {
    #[inline]
    fn from(err: GenerationError) -> Self {
        Self::Generation(err.to_string())
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<&'a Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Single non-streaming completion per report
#[derive(Debug, Clone)]
pub struct GenerationClient {
    url: Url,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
    agent: ureq::Agent,
}

impl GenerationClient {
    #[inline]
    pub fn new(config: &Config) -> Self {
        let timeout = config.ai.timeout();
        Self {
            url: config.ai.api_url.clone(),
            model: config.ai.model.clone(),
            api_key: config.ai.api_key.clone(),
            timeout,
            agent: ureq::Agent::config_builder()
                .timeout_global(Some(timeout))
                .build()
                .into(),
        }
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send `prompt` and return the trimmed `response` text.
    ///
    /// `options` is forwarded verbatim as the request's `options` object.
    #[inline]
    pub fn generate(
        &self,
        prompt: &str,
        options: Option<&Map<String, Value>>,
    ) -> std::result::Result<String, GenerationError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options,
        };
        let payload =
            serde_json::to_string(&request).map_err(|e| GenerationError::Encode(e.to_string()))?;
        debug!("Sending payload to AI: {}", payload);
        info!("Contacting AI at {} with model {}", self.url, self.model);

        let mut builder = self
            .agent
            .post(self.url.as_str())
            .header("Content-Type", "application/json");
        if let Some(api_key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let body = builder
            .send(&payload)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| match e {
                ureq::Error::StatusCode(status) => GenerationError::Status {
                    url: self.url.to_string(),
                    status,
                },
                ureq::Error::Timeout(_) => GenerationError::Timeout(self.timeout.as_secs()),
                other => GenerationError::Connection {
                    url: self.url.to_string(),
                    details: other.to_string(),
                },
            })?;

        info!("Received response, generating report");
        debug!("Received response from AI: {}", body);

        let response: GenerateResponse =
            serde_json::from_str(&body).map_err(|_| GenerationError::Decode)?;
        Ok(response.response.trim().to_string())
    }

    /// [`Self::generate`] on the blocking thread pool
    #[inline]
    pub async fn generate_async(
        &self,
        prompt: String,
        options: Option<Map<String, Value>>,
    ) -> Result<String> {
        let client = self.clone();
        match tokio::task::spawn_blocking(move || client.generate(&prompt, options.as_ref())).await
        {
            Ok(result) => Ok(result?),
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(AidbaError::Generation(format!(
                "Generation worker did not complete: {}",
                e
            ))),
        }
    }
}
