
use std::ops::Range;

use anyhow::Result;
use tiktoken_rs::CoreBPE;
use tracing::{debug, warn};

use crate::config::ConfigError;

/// Encoding used when a tokenizer profile is not recognized
pub const FALLBACK_ENCODING: &str = "cl100k_base";

/// Configuration for token-window chunking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkingConfig {
    /// Tokenizer profile: a tiktoken encoding name or a model name
    pub tokenizer: String,
    /// Maximum window length in tokens
    pub chunk_size: usize,
    /// Tokens shared by consecutive windows
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            tokenizer: "gpt-4".to_string(),
            chunk_size: 512,
            overlap: 50,
        }
    }
}

impl ChunkingConfig {
    /// Reject window settings that would never advance through the text
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=8192).contains(&self.chunk_size) {
            return Err(ConfigError::InvalidChunkSize(self.chunk_size));
        }

        if self.overlap >= self.chunk_size {
            return Err(ConfigError::OverlapTooLarge(self.overlap, self.chunk_size));
        }

        Ok(())
    }

    #[inline]
    pub const fn stride(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

/// Splits text into overlapping token windows
pub struct Chunker {
    bpe: CoreBPE,
    config: ChunkingConfig,
}

impl Chunker {
    /// Validate the configuration and load the tokenizer profile
    #[inline]
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        config.validate()?;
        let bpe = load_encoding(&config.tokenizer)?;
        Ok(Self { bpe, config })
    }

    #[inline]
    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    #[inline]
    pub fn token_count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }

    /// Split `text` into windows of at most `chunk_size` tokens.
    ///
    /// Every window yields a chunk. A character split across a window
    /// boundary decodes to U+FFFD on that edge.
    #[inline]
    pub fn chunk(&self, text: &str) -> Vec<String> {
        let windows = self.window_bytes(text);
        let chunks: Vec<String> = windows
            .iter()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .collect();

        debug!(
            "Chunked {} bytes into {} windows (size {}, overlap {})",
            text.len(),
            chunks.len(),
            self.config.chunk_size,
            self.config.overlap
        );

        chunks
    }

    /// Raw bytes of each token window, before UTF-8 conversion
    pub(crate) fn window_bytes(&self, text: &str) -> Vec<Vec<u8>> {
        if text.is_empty() {
            return Vec::new();
        }

        let tokens = self.bpe.encode_ordinary(text);
        window_ranges(tokens.len(), &self.config)
            .into_iter()
            .map(|range| {
                self.bpe
                    ._decode_native_and_split(tokens[range].to_vec())
                    .flatten()
                    .collect()
            })
            .collect()
    }
}

/// Split `text` into token windows using the named tokenizer profile
#[inline]
pub fn chunk_text(
    text: &str,
    tokenizer: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<String>> {
    let chunker = Chunker::new(ChunkingConfig {
        tokenizer: tokenizer.to_string(),
        chunk_size,
        overlap,
    })?;
    Ok(chunker.chunk(text))
}

/// Token ranges covered by each window.
///
/// Windows start at every multiple of the stride below `token_count`, so the
/// trailing windows can be shorter than `chunk_size`.
pub(crate) fn window_ranges(token_count: usize, config: &ChunkingConfig) -> Vec<Range<usize>> {
    (0..token_count)
        .step_by(config.stride())
        .map(|start| start..(start + config.chunk_size).min(token_count))
        .collect()
}

/// Resolve a tokenizer profile, falling back to [`FALLBACK_ENCODING`]
fn load_encoding(profile: &str) -> Result<CoreBPE> {
    let by_encoding = match profile {
        "cl100k_base" => Some(tiktoken_rs::cl100k_base()),
        "o200k_base" => Some(tiktoken_rs::o200k_base()),
        "p50k_base" => Some(tiktoken_rs::p50k_base()),
        "p50k_edit" => Some(tiktoken_rs::p50k_edit()),
        "r50k_base" => Some(tiktoken_rs::r50k_base()),
        _ => None,
    };

    if let Some(bpe) = by_encoding {
        return bpe;
    }

    match tiktoken_rs::get_bpe_from_model(profile) {
        Ok(bpe) => Ok(bpe),
        Err(e) => {
            warn!(
                "Unknown tokenizer profile '{}' ({}), falling back to {}",
                profile, e, FALLBACK_ENCODING
            );
            tiktoken_rs::cl100k_base()
        }
    }
}
