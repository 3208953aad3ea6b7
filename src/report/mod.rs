// Report module
// Snapshot + optional knowledge base context -> generated analysis -> Markdown file

pub mod generation;
pub mod prompt;


use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::{DateTime, Local};
use serde_json::Value;
use tokio::fs;
use tracing::{error, info};

use crate::config::Config;
use crate::retrieval::RagProvider;
use crate::retrieval::query::metadata_field;
use crate::{AidbaError, Result};

pub use generation::{GenerationClient, GenerationError};
pub use prompt::{PromptError, render_prompt};

/// Database name used in the file name when the snapshot has none
pub const UNKNOWN_DB: &str = "unknown_db";

const LICENSE_LINE: &str = "*License: Apache 2.0 (meob)*";

/// `<prefix>.<database>.<YYYYmmdd_HHMMSS>.md`
#[inline]
pub fn output_file_name(prefix: &str, database_name: &str, started: &DateTime<Local>) -> String {
    let database_name = database_name.replace(['/', '\\'], "_");
    format!(
        "{}.{}.{}.md",
        prefix,
        database_name,
        started.format("%Y%m%d_%H%M%S")
    )
}

#[inline]
pub fn render_footer(
    profile: &str,
    started: &DateTime<Local>,
    model: &str,
    duration: Duration,
) -> String {
    format!(
        "\n---\n\
         *Report generated by pg_aidba ({}) on {}*\n\
         *Model used: `{}`*\n\
         *Analysis duration: {:.2} seconds*\n\
         {}\n",
        profile,
        started.format("%Y-%m-%d at %H:%M:%S"),
        model,
        duration.as_secs_f64(),
        LICENSE_LINE
    )
}

/// Report body for a failed generation call
#[inline]
pub fn error_body(err: &AidbaError) -> String {
    match err {
        AidbaError::Generation(msg) => format!("Error: {}", msg),
        other => format!("Error: {}", other),
    }
}

/// Runs one analysis profile end to end
pub struct ReportGenerator<'a> {
    config: &'a Config,
    rag: Box<dyn RagProvider>,
    client: GenerationClient,
}

impl<'a> ReportGenerator<'a> {
    #[inline]
    pub fn new(config: &'a Config, rag: Box<dyn RagProvider>) -> Self {
        Self {
            config,
            rag,
            client: GenerationClient::new(config),
        }
    }

    /// Generate the report for `profile_name` and write it into `output_dir`.
    ///
    /// Unknown profile names fall back to `base`. A missing or malformed
    /// snapshot or prompt template is an error; a failed generation call is
    /// written into the report instead.
    #[inline]
    pub async fn run(&self, profile_name: &str, output_dir: &Path) -> Result<PathBuf> {
        let (profile_name, profile) = self.config.profile(profile_name)?;
        info!("--- Running analysis type: '{}' ---", profile_name);

        let started = Local::now();
        let timer = Instant::now();

        let json_data = fs::read_to_string(&profile.data_file).await.map_err(|e| {
            AidbaError::Input(format!(
                "The file '{}' was not found or could not be read: {}",
                profile.data_file.display(),
                e
            ))
        })?;
        let snapshot: Value = serde_json::from_str(&json_data).map_err(|e| {
            AidbaError::Input(format!(
                "Could not decode JSON from '{}', the file might be empty or malformed: {}",
                profile.data_file.display(),
                e
            ))
        })?;

        let rag_context = if profile.rag {
            self.rag.context(&snapshot).await
        } else {
            String::new()
        };

        let template = fs::read_to_string(&profile.prompt_file)
            .await
            .with_context(|| format!("Prompt file '{}' not found", profile.prompt_file.display()))?;
        let prompt = render_prompt(&template, &rag_context, &json_data)
            .map_err(|e| AidbaError::Input(format!("{}: {}", profile.prompt_file.display(), e)))?;

        let options = self.config.llm_params_for(profile_name).cloned();
        let analysis = match self.client.generate_async(prompt, options).await {
            Ok(text) => text,
            Err(e) => {
                error!("Generation failed: {}", e);
                error_body(&e)
            }
        };

        let duration = timer.elapsed();
        let database_name = metadata_field(snapshot.get("metadata"), "database_name", UNKNOWN_DB);
        let path = output_dir.join(output_file_name(
            &profile.output_prefix,
            &database_name,
            &started,
        ));

        let footer = render_footer(profile_name, &started, self.client.model(), duration);
        let report = format!("{}\n{}", analysis, footer);
        fs::write(&path, report).await.map_err(|e| {
            AidbaError::Io(std::io::Error::new(
                e.kind(),
                format!("Could not write report to file '{}': {}", path.display(), e),
            ))
        })?;

        info!("--- Report successfully saved to '{}' ---", path.display());
        Ok(path)
    }
}
