//! CLI command implementations.

pub mod bootstraps;
pub mod check;
pub mod config;
pub mod replay;

use std::path::PathBuf;

use clap::{Args, Subcommand};
use resident_kernel::{ApplicationFactory, BootstrapRegistry, EnvSettings};

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration.
    Show,
    /// Write a config file holding the defaults.
    Init {
        /// Output file path.
        #[arg(default_value = "resident.toml")]
        path: PathBuf,
        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Validate the config file.
    Validate,
}

/// Arguments for the bootstraps command.
#[derive(Args)]
pub struct BootstrapsArgs {
    /// Show the names tried when resolving this identifier.
    #[arg(long)]
    pub resolve: Option<String>,
}

/// Arguments for the check command.
#[derive(Args)]
pub struct CheckArgs {
    /// Bootstrap identifier (default: from config).
    #[arg(short, long)]
    pub bootstrap: Option<String>,

    /// Application environment (default: from config).
    #[arg(short, long)]
    pub env: Option<String>,
}

/// Arguments for the replay command.
#[derive(Args)]
pub struct ReplayArgs {
    /// HTTP method.
    #[arg(default_value = "GET")]
    pub method: String,

    /// Request target, e.g. `/stream?chunks=3`.
    #[arg(default_value = "/")]
    pub target: String,

    /// Request header as `Name: value`. Repeatable.
    #[arg(short = 'H', long = "header")]
    pub headers: Vec<String>,

    /// Request body.
    #[arg(short, long)]
    pub body: Option<String>,

    /// JSON file with a list of requests to send instead.
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Send the request this many times.
    #[arg(short, long, default_value = "1")]
    pub repeat: usize,

    /// Return cookies set by earlier responses on later requests.
    #[arg(long)]
    pub keep_cookies: bool,

    /// Bootstrap identifier (default: from config).
    #[arg(long)]
    pub bootstrap: Option<String>,
}

/// Factory over every bootstrap this binary knows about.
pub fn factory() -> ApplicationFactory {
    ApplicationFactory::new(registry()).with_settings(EnvSettings::from_env())
}

/// Registry of built-in bootstraps.
pub fn registry() -> BootstrapRegistry {
    demo_shop::registry()
}
