//! Cipherfolio CLI - scenario runner for the confidential rebalancing engine
//!
//! Seeds an in-process engine (clear-text backend) from a TOML scenario file
//! and drives create/status/rebalance cycles against it, printing decrypted
//! views that only exist because the backend is the test one.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod config;
mod demo;
mod portfolio;
mod rebalance;
mod session;

use config::PortfolioConfig;

#[derive(Parser)]
#[command(name = "cipherfolio")]
#[command(about = "Confidential portfolio rebalancing - scenario runner", long_about = None)]
#[command(version)]
struct Cli {
    /// Verbose output (debug-level logging)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a scenario file and create its portfolio
    Create {
        /// Path to the scenario TOML
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Show the decrypted portfolio state for a scenario
    Status {
        /// Path to the scenario TOML
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Run rebalance cycles and print each decrypted batch
    Rebalance {
        /// Path to the scenario TOML
        #[arg(short, long)]
        config: PathBuf,

        /// Number of cycles (overrides the scenario's simulation section)
        #[arg(long)]
        cycles: Option<u32>,
    },

    /// Scripted three-asset walkthrough
    Demo,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if cli.verbose {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    match cli.command {
        Commands::Create { config } => {
            let config = PortfolioConfig::load(&config)?;
            portfolio::create(&config)?;
        }
        Commands::Status { config } => {
            let config = PortfolioConfig::load(&config)?;
            portfolio::status(&config)?;
        }
        Commands::Rebalance { config, cycles } => {
            let config = PortfolioConfig::load(&config)?;
            let cycles = cycles.unwrap_or(config.simulation.cycles);
            rebalance::run(&config, cycles)?;
        }
        Commands::Demo => {
            demo::run()?;
        }
    }

    Ok(())
}
