//! Worker configuration.

use std::path::{Path, PathBuf};

use resident_session::SessionSettings;
use serde::{Deserialize, Serialize};

/// Environment variable overriding `bootstrap.env`.
pub const APP_ENV_VAR: &str = "APP_ENV";
/// Environment variable overriding `bootstrap.debug`.
pub const APP_DEBUG_VAR: &str = "APP_DEBUG";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse TOML config {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to parse JSON config {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(String),
}

/// Worker configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Which application to boot.
    #[serde(default)]
    pub bootstrap: BootstrapConfig,

    /// Session cookie settings.
    #[serde(default)]
    pub session: SessionSettings,

    /// Temporary upload storage.
    #[serde(default)]
    pub uploads: UploadConfig,

    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl WorkerConfig {
    /// Load config from a file. JSON when the extension says so, TOML
    /// otherwise.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        if is_json(path) {
            serde_json::from_str(&content).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })
        } else {
            toml::from_str(&content).map_err(|source| ConfigError::Toml {
                path: path.to_path_buf(),
                source,
            })
        }
    }

    /// Load config from `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Render in the format matching `path`'s extension.
    pub fn render(&self, path: impl AsRef<Path>) -> Result<String, ConfigError> {
        if is_json(path.as_ref()) {
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
        } else {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
        }
    }

    /// Apply `APP_ENV` and `APP_DEBUG` from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply `APP_ENV` and `APP_DEBUG` read through `lookup`.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(env) = lookup(APP_ENV_VAR).filter(|v| !v.is_empty()) {
            self.bootstrap.env = env;
        }
        if let Some(debug) = lookup(APP_DEBUG_VAR) {
            self.bootstrap.debug = parse_flag(&debug);
        }
        self
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Bootstrap selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Bootstrap identifier, resolved through the bootstrap registry.
    pub identifier: String,
    /// Application environment.
    pub env: String,
    /// Debug mode.
    pub debug: bool,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            identifier: "demo".to_string(),
            env: "prod".to_string(),
            debug: false,
        }
    }
}

/// Where temporary upload copies are written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Directory for temporary copies. The system temp dir when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,
    /// Filename prefix for temporary copies.
    pub prefix: String,
}

impl UploadConfig {
    /// The directory temporary copies go to.
    pub fn dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            temp_dir: None,
            prefix: "resident-upload-".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}
