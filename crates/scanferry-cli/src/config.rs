use crate::cli::{Cli, LogLevel};
use anyhow::{Context, Result};
use scanferry_watch::UploaderConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// CLI configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Log level used when no flag overrides it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<LogLevel>,
    /// Watch and upload behaviour
    pub uploader: UploaderConfig,
    /// Google Drive access
    pub drive: DriveConfig,
}

/// Google Drive configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    /// OAuth client secrets file
    pub creds_file: PathBuf,
    /// OAuth token cache
    pub token_file: PathBuf,
    /// API host override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Resumable upload chunk size in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<usize>,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            creds_file: PathBuf::from("/data/credentials.json"),
            token_file: PathBuf::from("/data/token.json"),
            base_url: None,
            chunk_size: None,
        }
    }
}

impl CliConfig {
    /// Load configuration with precedence: defaults < file < env < args
    pub fn load(cli: &Cli) -> Result<Self> {
        Self::load_with_env(cli, |key| std::env::var(key).ok())
    }

    /// Same as [`load`](Self::load) with environment lookups going through `env`.
    pub fn load_with_env(cli: &Cli, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::from_file_or_default(cli.config.as_deref())?;

        // Override with env vars
        if let Some(dir) = env("SCANFERRY_INPUT_DIR") {
            config.uploader.input_dir = PathBuf::from(dir);
        }
        if let Some(folder) = env("SCANFERRY_OUTPUT_DIR") {
            config.uploader.output_folder = folder;
        }
        if let Some(path) = env("SCANFERRY_CREDS_FILE") {
            config.drive.creds_file = PathBuf::from(path);
        }
        if let Some(path) = env("SCANFERRY_TOKEN_FILE") {
            config.drive.token_file = PathBuf::from(path);
        }

        // Override with CLI args (highest priority)
        if let Some(dir) = &cli.input_dir {
            config.uploader.input_dir = dir.clone();
        }
        if let Some(folder) = &cli.output_dir {
            config.uploader.output_folder = folder.clone();
        }
        if let Some(path) = &cli.creds_file {
            config.drive.creds_file = path.clone();
        }
        if let Some(path) = &cli.token_file {
            config.drive.token_file = path.clone();
        }
        if let Some(enabled) = cli.upload_on_startup {
            config.uploader.upload_on_startup = enabled;
        }
        if let Some(ms) = cli.poll_interval_ms {
            config.uploader.poll_interval_ms = ms;
        }

        Ok(config)
    }

    /// Get default config file path
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("scanferry");
        Ok(config_dir.join("config.toml"))
    }

    /// Load config from file or return default.
    ///
    /// An explicitly named file must exist; the default location is optional.
    fn from_file_or_default(config_file: Option<&Path>) -> Result<Self> {
        let path = match config_file {
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_config_path().ok().filter(|p| p.exists()),
        };

        if let Some(path) = path {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    /// Display the current configuration as TOML
    pub fn display_as_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config as TOML")
    }
}
