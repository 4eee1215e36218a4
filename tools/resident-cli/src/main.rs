//! Resident CLI - inspect and exercise resident request bridge workers.
//!
//! Commands:
//! - `resident config` - Show or validate worker configuration
//! - `resident bootstraps` - List registered bootstraps
//! - `resident check` - Bootstrap the configured application and report on it
//! - `resident replay` - Send requests through a bridge and print the responses

mod commands;
mod context;
mod logging;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{BootstrapsArgs, CheckArgs, ConfigArgs, ReplayArgs};

/// Resident CLI - Inspect and exercise resident application workers
#[derive(Parser)]
#[command(name = "resident")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use JSON output format
    #[arg(long, global = true)]
    json: bool,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or validate worker configuration
    Config(ConfigArgs),

    /// List registered bootstraps
    Bootstraps(BootstrapsArgs),

    /// Bootstrap the configured application and report on it
    Check(CheckArgs),

    /// Send requests through a bridge and print the responses
    Replay(ReplayArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let output = output::Output::new(cli.verbose, cli.json);

    let ctx = match context::Context::load(cli.config.as_deref(), output.clone()) {
        Ok(ctx) => ctx,
        Err(e) => {
            output.error(&format!("{:#}", e));
            std::process::exit(1);
        }
    };
    logging::init(&ctx.config.logging, cli.verbose);

    let result = match cli.command {
        Commands::Config(args) => commands::config::run(args, &ctx).await,
        Commands::Bootstraps(args) => commands::bootstraps::run(args, &ctx).await,
        Commands::Check(args) => commands::check::run(args, &ctx).await,
        Commands::Replay(args) => commands::replay::run(args, &ctx).await,
    };

    if let Err(e) = result {
        ctx.output.error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
