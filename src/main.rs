//! Pool Sniper - capital-pool-gated token sniper
//!
//! # WARNING
//! - This bot trades with real money. Only use funds you can afford to lose.
//! - Most freshly launched tokens go to zero (rug pulls, abandonment).
//! - Passing the admission filter is not a guarantee of anything.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;

// Use the library crate
use pool_sniper::cli::commands;
use pool_sniper::config::Config;

/// Pool Sniper - capital-pool-gated token sniper
#[derive(Parser)]
#[command(name = "poolsnipe")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the admission pipeline
    Start {
        /// Run with simulated chain data and fills (no real trades)
        #[arg(long)]
        dry_run: bool,
    },

    /// Show current configuration (secrets masked)
    Config,

    /// Show the most recent pool ledger rows
    Ledger {
        /// Number of rows to display
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pool_sniper=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    match cli.command {
        Commands::Start { dry_run } => commands::start(&config, dry_run).await,
        Commands::Config => {
            commands::show_config(&config);
            Ok(())
        }
        Commands::Ledger { limit } => commands::show_ledger(&config, limit).await,
    }
}
