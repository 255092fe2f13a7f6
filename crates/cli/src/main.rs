//! Try-On CLI - Main Entry Point
//!
//! Command-line front end for the virtual try-on backend: load a person
//! and a garment image, tune the generation parameters, submit, and save
//! the result.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use tryon_common::ClientConfig;

mod commands;
mod output;

use commands::{generate, health, samples};

/// Try-On CLI - virtual try-on client
#[derive(Parser)]
#[command(name = "tryon")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = "tryon.toml", global = true)]
    config: PathBuf,

    /// Upload endpoint, absolute or relative to the configured base URL
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a try-on image from a person and a garment image
    Generate(generate::GenerateArgs),

    /// Download the stock person/garment sample images
    FetchSamples(samples::FetchSamplesArgs),

    /// Check backend health
    Health,

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    let mut config = ClientConfig::load(&cli.config)?.with_env()?;
    if let Some(api_url) = cli.api_url {
        config.api_url = api_url;
    }
    tracing::debug!("Loaded configuration from {}: {:?}", cli.config.display(), config);

    match cli.command {
        Commands::Generate(args) => generate::execute(args, &config, cli.format).await?,
        Commands::FetchSamples(args) => samples::execute(args, cli.format).await?,
        Commands::Health => health::execute(&config, cli.format).await?,
        Commands::Version => {
            println!("Try-On CLI v{}", tryon_common::VERSION);
            println!("Endpoint: {}", config.endpoint_url()?);
        }
    }

    Ok(())
}
