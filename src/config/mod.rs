// Configuration management module
// Loads the TOML configuration that every pipeline is constructed from

pub mod settings;


pub use settings::{
    AiConfig, AnalysisProfile, Config, ConfigError, MODEL_ENV_VAR, RagConfig, THRESHOLD_DISABLED,
};

/// Default configuration file name, resolved against the working directory
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";
