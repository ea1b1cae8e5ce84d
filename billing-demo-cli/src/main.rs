//! Billing Demo CLI
//!
//! Command-line host for the billing bridge. Plays the platform side against
//! an in-process sandbox store.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod ui;

#[derive(Parser)]
#[command(name = "billing-demo")]
#[command(about = "Billing Demo CLI - drive an in-app billing session against a sandbox store", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Session configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Application package name
    #[arg(long, global = true)]
    package: Option<String>,

    /// Storefront to use (google_play, amazon)
    #[arg(long, global = true)]
    storefront: Option<String>,

    /// Installer package name used to pick the storefront
    #[arg(long, global = true)]
    installer: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Read JSON-line commands from stdin and print events as JSON lines
    Run,

    /// Walk through every billing operation against the sandbox
    Demo,

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; stdout is reserved for events
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("billing_demo=debug,billing_bridge=debug")
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("billing_demo=info,billing_bridge=warn")
            .with_writer(std::io::stderr)
            .init();
    }

    let config = commands::load_config(
        cli.config.as_deref(),
        commands::ConfigOverrides {
            package: cli.package,
            storefront: cli.storefront,
            installer: cli.installer,
        },
    )?;

    match cli.command {
        Commands::Run => commands::run::run(config, cli.verbose).await?,
        Commands::Demo => commands::demo::run(config, cli.verbose).await?,
        Commands::Config => commands::config::run(&config, cli.verbose)?,
    }

    Ok(())
}
