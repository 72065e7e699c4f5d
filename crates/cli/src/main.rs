//! Storefront E2E CLI - Main Entry Point
//!
//! Operator commands around the test harness: find the storefront project,
//! keep its dev server up, and push results to Kualitee by hand.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use storefront_harness::HarnessConfig;

mod commands;

use commands::{discover, probe, report, serve};

/// Storefront E2E - dev server supervision and Kualitee reporting
#[derive(Parser)]
#[command(name = "storefront-e2e")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Harness configuration file
    #[arg(short, long, default_value = "storefront-e2e.toml", global = true)]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the discovered project root
    Discover(discover::DiscoverArgs),

    /// Check whether the dev server port is serving
    Probe(probe::ProbeArgs),

    /// Start (or reuse) the dev server and keep it up until Ctrl-C
    Serve(serve::ServeArgs),

    /// Push a single execution result to Kualitee
    Report(report::ReportArgs),
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

    let mut config = HarnessConfig::load(&cli.config)?;
    config.apply_env();

    match cli.command {
        Commands::Discover(args) => discover::execute(args, config)?,
        Commands::Probe(args) => probe::execute(args, config)?,
        Commands::Serve(args) => serve::execute(args, config).await?,
        Commands::Report(args) => report::execute(args, config)?,
    }

    Ok(())
}
