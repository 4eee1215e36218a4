//! CLI execution context.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use resident_kernel::WorkerConfig;

use crate::output::Output;

/// Config file names searched for when `--config` is not given.
const CONFIG_NAMES: [&str; 3] = ["resident.toml", ".resident.toml", "resident.json"];

/// Execution context for CLI commands.
pub struct Context {
    /// Worker configuration, environment overrides applied.
    pub config: WorkerConfig,
    /// Where the configuration came from, if a file was found.
    pub config_path: Option<PathBuf>,
    /// Output handler.
    pub output: Output,
}

impl Context {
    /// Load context from a config file.
    pub fn load(config_path: Option<&str>, output: Output) -> Result<Self> {
        let path = match config_path {
            Some(path) => Some(PathBuf::from(path)),
            None => {
                let cwd = std::env::current_dir().context("Failed to get current directory")?;
                find_config(&cwd)
            }
        };

        let config = match &path {
            Some(path) => WorkerConfig::load(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => WorkerConfig::default(),
        };

        Ok(Self {
            config: config.with_env_overrides(),
            config_path: path,
            output,
        })
    }
}

/// Find a config file in `start` or one of its parents.
fn find_config(start: &Path) -> Option<PathBuf> {
    start.ancestors().find_map(|dir| {
        CONFIG_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|candidate| candidate.is_file())
    })
}
