use anyhow::Result;
use clap::{Parser, Subcommand};
use pg_aidba::commands::{run_analysis, run_load, show_config, show_status};
use pg_aidba::config::{Config, DEFAULT_CONFIG_FILE};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pg-aidba")]
#[command(about = "AI-assisted PostgreSQL diagnostics reports with a pgvector knowledge base")]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the knowledge base from the reference documents
    Load,
    /// Generate a report for an analysis profile
    Analyze {
        /// Analysis profile, e.g. "base" or "perf"
        #[arg(default_value = "base")]
        profile: String,
    },
    /// Show the number of records in the knowledge base
    Status,
    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    let default_level = if cli.debug || config.debug_mode {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Load => {
            run_load(&config).await?;
        }
        Commands::Analyze { profile } => {
            run_analysis(&config, &profile).await?;
        }
        Commands::Status => {
            show_status(&config).await?;
        }
        Commands::Config => {
            show_config(&config)?;
        }
    }

    Ok(())
}
