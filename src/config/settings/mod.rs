#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::database::{DistanceMetric, SearchParams, SortOrder};
use crate::embeddings::chunking::ChunkingConfig;

/// Environment variable that overrides the generation model
pub const MODEL_ENV_VAR: &str = "AI_MODEL";

const DEFAULT_GENERATION_MODEL: &str = "llama3:8b";
const DEFAULT_TABLE_NAME: &str = "pg_aidba_rag_kb";
const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Threshold values at or above this sentinel disable distance filtering
pub const THRESHOLD_DISABLED: f64 = 1.0;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub debug_mode: bool,
    pub ai: AiConfig,
    pub rag: RagConfig,
    pub analysis_profiles: BTreeMap<String, AnalysisProfile>,
    pub llm_params: BTreeMap<String, serde_json::Map<String, serde_json::Value>>,
}

/// Text-generation and embedding service settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AiConfig {
    pub api_url: Url,
    pub embedding_url: Url,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub model: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_url: Url::parse("http://localhost:11434/api/generate")
                .expect("default generation URL is valid"),
            embedding_url: Url::parse("http://localhost:11434/api/embeddings")
                .expect("default embedding URL is valid"),
            api_key: None,
            timeout_secs: 120,
            model: DEFAULT_GENERATION_MODEL.to_string(),
        }
    }
}

/// Knowledge base settings shared by ingestion and retrieval
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,
    pub embedding_model: String,
    pub tokenizer: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub table_name: String,
    pub distance_metric: DistanceMetric,
    pub inner_product_order: SortOrder,
    pub similarity_threshold: f64,
    pub retrieval_limit: u32,
    pub source_dir: PathBuf,
    pub embedding_concurrency: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            connection_string: None,
            embedding_model: "nomic-embed-text".to_string(),
            tokenizer: "gpt-4".to_string(),
            chunk_size: 512,
            chunk_overlap: 50,
            table_name: DEFAULT_TABLE_NAME.to_string(),
            distance_metric: DistanceMetric::Cosine,
            inner_product_order: SortOrder::Ascending,
            similarity_threshold: THRESHOLD_DISABLED,
            retrieval_limit: 5,
            source_dir: PathBuf::from("rag_sources"),
            embedding_concurrency: 4,
        }
    }
}

/// One kind of report: which snapshot to read, which prompt to fill in
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisProfile {
    pub data_file: PathBuf,
    pub prompt_file: PathBuf,
    pub output_prefix: String,
    /// Enrich the prompt with knowledge base context
    #[serde(default)]
    pub rag: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid URL scheme for {0}: {1} (must be 'http' or 'https')")]
    InvalidScheme(&'static str, String),
    #[error("Invalid model name: {0:?} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid timeout: {0} (must be between 1 and 3600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid chunk size: {0} (must be between 1 and 8192 tokens)")]
    InvalidChunkSize(usize),
    #[error("Chunk overlap ({0}) must be smaller than chunk size ({1})")]
    OverlapTooLarge(usize, usize),
    #[error("Invalid table name: {0:?} (must be a plain SQL identifier)")]
    InvalidTableName(String),
    #[error("Invalid similarity threshold: {0} (must be a finite number)")]
    InvalidThreshold(f64),
    #[error("Invalid retrieval limit: {0} (must be between 1 and 1000)")]
    InvalidRetrievalLimit(u32),
    #[error("Invalid embedding concurrency: {0} (must be between 1 and 64)")]
    InvalidConcurrency(usize),
    #[error("`connection_string` not found in the [rag] section")]
    MissingConnectionString,
    #[error("Analysis profile '{0}' not found")]
    MissingProfile(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Load, apply environment overrides and validate a configuration file
    #[inline]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        if let Ok(model) = env::var(MODEL_ENV_VAR) {
            config.ai.apply_model_override(&model);
        }

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ai.validate()?;
        self.rag.validate()?;
        Ok(())
    }

    /// Resolve an analysis profile, falling back to `base` for unknown names
    #[inline]
    pub fn profile<'a>(&'a self, name: &'a str) -> Result<(&'a str, &'a AnalysisProfile), ConfigError> {
        if let Some(profile) = self.analysis_profiles.get(name) {
            return Ok((name, profile));
        }

        self.analysis_profiles
            .get("base")
            .map(|profile| ("base", profile))
            .ok_or_else(|| ConfigError::MissingProfile(name.to_string()))
    }

    /// Generation options for a profile, if any were configured
    #[inline]
    pub fn llm_params_for(&self, profile: &str) -> Option<&serde_json::Map<String, serde_json::Value>> {
        self.llm_params.get(profile).filter(|params| !params.is_empty())
    }

    /// Copy of the configuration that is safe to print
    #[inline]
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.ai.api_key.is_some() {
            config.ai.api_key = Some("********".to_string());
        }
        if let Some(conn) = config.rag.connection_string.as_mut() {
            *conn = redact_connection_string(conn);
        }
        config
    }

    #[inline]
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

impl AiConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, url) in [("api_url", &self.api_url), ("embedding_url", &self.embedding_url)] {
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(ConfigError::InvalidScheme(name, url.scheme().to_string()));
            }
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if !(1..=3600).contains(&self.timeout_secs) {
            return Err(ConfigError::InvalidTimeout(self.timeout_secs));
        }

        Ok(())
    }

    #[inline]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    #[inline]
    pub fn apply_model_override(&mut self, model: &str) {
        if !model.trim().is_empty() {
            self.model = model.trim().to_string();
        }
    }
}

impl RagConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.embedding_model.clone()));
        }

        self.chunking().validate()?;

        if !is_valid_identifier(&self.table_name) {
            return Err(ConfigError::InvalidTableName(self.table_name.clone()));
        }

        if !self.similarity_threshold.is_finite() {
            return Err(ConfigError::InvalidThreshold(self.similarity_threshold));
        }

        if !(1..=1000).contains(&self.retrieval_limit) {
            return Err(ConfigError::InvalidRetrievalLimit(self.retrieval_limit));
        }

        if !(1..=64).contains(&self.embedding_concurrency) {
            return Err(ConfigError::InvalidConcurrency(self.embedding_concurrency));
        }

        Ok(())
    }

    #[inline]
    pub fn chunking(&self) -> ChunkingConfig {
        ChunkingConfig {
            tokenizer: self.tokenizer.clone(),
            chunk_size: self.chunk_size,
            overlap: self.chunk_overlap,
        }
    }

    #[inline]
    pub fn search_params(&self) -> SearchParams {
        SearchParams {
            metric: self.distance_metric,
            threshold: (self.similarity_threshold < THRESHOLD_DISABLED)
                .then_some(self.similarity_threshold),
            limit: self.retrieval_limit,
            inner_product_order: self.inner_product_order,
        }
    }

    /// Connection string, or the error for pipelines that cannot run without one
    #[inline]
    pub fn require_connection_string(&self) -> Result<&str, ConfigError> {
        self.connection_string
            .as_deref()
            .filter(|conn| !conn.trim().is_empty())
            .ok_or(ConfigError::MissingConnectionString)
    }
}

/// Plain SQL identifier check for names interpolated into statements
#[inline]
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };

    name.len() <= MAX_IDENTIFIER_LENGTH
        && (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn redact_connection_string(conn: &str) -> String {
    let Ok(mut url) = Url::parse(conn) else {
        return "********".to_string();
    };
    // urls without a host cannot carry a replacement password
    if url.password().is_some() && url.set_password(Some("********")).is_err() {
        return "********".to_string();
    }
    url.to_string()
}
