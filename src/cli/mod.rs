//! CLI parser and command dispatch.

mod init;
mod quota_cmd;
mod regions;
mod search;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{load_settings_with_options, LoadOptions};

#[derive(Parser)]
#[command(name = "adatlas")]
#[command(about = "Regional classified-listing statistics")]
#[command(version)]
pub struct Cli {
    /// Data directory (overrides config file).
    #[arg(long, short = 't', global = true)]
    target: Option<PathBuf>,

    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and quota store
    Init,

    /// Run search jobs and print regional statistics
    Search {
        /// Search terms (one job per term)
        terms: Vec<String>,
        /// Listings to collect per term
        #[arg(short = 'n', long)]
        sample_size: Option<u32>,
        /// Maximum listing age in days
        #[arg(short = 'a', long)]
        max_age: Option<u32>,
        /// Print the full result as JSON instead of tables
        #[arg(long)]
        json: bool,
        /// Also print the correlation matrix
        #[arg(long)]
        correlations: bool,
    },

    /// Show the quota window state
    Quota,

    /// Print the region reference table
    Regions,
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        target: cli.target,
    };
    let (settings, _config) = load_settings_with_options(options).await;

    match cli.command {
        Commands::Init => init::cmd_init(&settings).await,
        Commands::Search {
            terms,
            sample_size,
            max_age,
            json,
            correlations,
        } => search::cmd_search(&settings, &terms, sample_size, max_age, json, correlations).await,
        Commands::Quota => quota_cmd::cmd_quota(&settings).await,
        Commands::Regions => regions::cmd_regions(&settings).await,
    }
}
