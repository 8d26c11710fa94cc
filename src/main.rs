mod cli;
mod commands;
mod pipeline;
mod seeds;

use anyhow::Result;
use clap::Parser;
use tracing::warn;

// Fetch workers and tokenization run at high concurrency; mimalloc avoids
// the memory bloat glibc's allocator shows under that load.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use tuer_core::AppConfig;

use crate::cli::{Cli, Commands};

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config_str = std::fs::read_to_string(&cli.config).unwrap_or_else(|_| {
        warn!(path = %cli.config, "config file not found, using embedded defaults");
        include_str!("../config/default.toml").to_string()
    });
    let config: AppConfig = toml::from_str(&config_str)?;

    let exit_code = match cli.command {
        Commands::Crawl { seeds, seed, depth } => pipeline::run_crawl(config, seeds, seed, depth).await?,
        Commands::Search { query, limit } => {
            commands::search::run(config, query, limit).await?;
            0
        }
        Commands::Status => {
            commands::status::run(config).await?;
            0
        }
        Commands::Reindex => {
            commands::reindex::run(config).await?;
            0
        }
        Commands::Serve { addr } => {
            commands::serve::run(config, addr).await?;
            0
        }
    };

    std::process::exit(exit_code);
}
