//! Cadence CLI - run the scheduler headless and inspect its configuration

mod commands;
mod demo;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{config, run};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cadence")]
#[command(about = "Per-frame update scheduler for real-time simulations", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the demo scene headless and print callback metrics
    Run {
        /// Scheduler config file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Number of frames to simulate
        #[arg(long, default_value = "600")]
        frames: u64,

        /// Simulated frame rate
        #[arg(long, default_value = "144")]
        fps: f64,

        /// Worker pool size, overriding the config
        #[arg(long)]
        workers: Option<usize>,

        /// Number of animated rigs in the demo scene
        #[arg(long, default_value = "8")]
        rigs: usize,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Scheduler config file (TOML); defaults are printed without one
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("warn"));
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            frames,
            fps,
            workers,
            rigs,
        } => run::run(run::RunArgs {
            config,
            frames,
            fps,
            workers,
            rigs,
        }),
        Commands::Config { config: path } => config::run(path.as_deref()),
    }
}
