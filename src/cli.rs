use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tuer", about = "A focused vertical search engine for a topical slice of the web")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Crawl from the frontier snapshot, or from seeds if none exists
    Crawl {
        /// Seed URLs, comma-separated, or a path to a newline-delimited file
        #[arg(short, long)]
        seeds: Option<String>,

        /// A single additional seed URL
        #[arg(long)]
        seed: Option<String>,

        /// Maximum crawl depth (overrides config)
        #[arg(short, long)]
        depth: Option<u32>,
    },
    /// Run a ranked query against the index
    Search {
        /// Free-form query text
        query: String,

        /// Max results
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
    /// Show index and frontier status
    Status,
    /// Replay the raw blob store into the indexer without recrawling
    Reindex,
    /// Serve the thin HTTP query endpoint (GET /search?query=...)
    Serve {
        /// Address to bind
        #[arg(short, long, default_value = "127.0.0.1:8080")]
        addr: String,
    },
}
