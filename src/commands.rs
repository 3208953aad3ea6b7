use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::Config;
use crate::database::{PgVectorStore, VectorStore};
use crate::embeddings::OllamaClient;
use crate::indexer::{Indexer, IngestionReport};
use crate::report::ReportGenerator;
use crate::retrieval::rag_provider;

/// Rebuild the knowledge base from the configured source directory
#[inline]
pub async fn run_load(config: &Config) -> Result<IngestionReport> {
    info!("Connecting to the database");
    let store = PgVectorStore::from_config(config)
        .await
        .context("Failed to open the knowledge base")?;

    let mut indexer = Indexer::new(OllamaClient::new(config), store, &config.rag);
    let result = indexer.run().await;
    indexer.into_store().close().await;
    let report = result.context("Knowledge base loading failed")?;

    println!(
        "Loaded {} chunks from {} documents into '{}'",
        report.inserted, report.documents, config.rag.table_name
    );
    if report.skipped > 0 {
        println!("  Skipped chunks (embedding failed): {}", report.skipped);
    }

    Ok(report)
}

/// Generate the report for `profile` into the current directory
#[inline]
pub async fn run_analysis(config: &Config, profile: &str) -> Result<PathBuf> {
    run_analysis_in(config, profile, Path::new(".")).await
}

#[inline]
pub async fn run_analysis_in(config: &Config, profile: &str, output_dir: &Path) -> Result<PathBuf> {
    let generator = ReportGenerator::new(config, rag_provider(config));
    let path = generator
        .run(profile, output_dir)
        .await
        .with_context(|| format!("Analysis '{}' failed", profile))?;

    println!("Report saved to '{}'", path.display());
    Ok(path)
}

/// Print the number of records in the knowledge base
#[inline]
pub async fn show_status(config: &Config) -> Result<i64> {
    let store = PgVectorStore::from_config(config)
        .await
        .context("Failed to open the knowledge base")?;
    let count = store.count().await;
    store.close().await;
    let count = count.context("Failed to count knowledge base records")?;

    println!("Knowledge base table: {}", config.rag.table_name);
    println!("Records: {}", count);
    Ok(count)
}

/// Print the effective configuration with secrets masked
#[inline]
pub fn show_config(config: &Config) -> Result<()> {
    let text = config
        .redacted()
        .to_toml()
        .context("Failed to serialize configuration")?;
    println!("{}", text);
    Ok(())
}
