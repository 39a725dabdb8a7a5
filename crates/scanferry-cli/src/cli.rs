use clap::{ArgAction, Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing_subscriber::filter::LevelFilter;

/// Log level options for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// No logging output
    Off,
    /// Error messages only
    Error,
    /// Warnings and errors
    Warn,
    /// Informational messages (default)
    Info,
    /// Debug messages
    Debug,
    /// Trace-level messages (most verbose)
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "scanferry")]
#[command(about = "Upload finished files from a watched directory to Google Drive, then delete them")]
#[command(version)]
pub struct Cli {
    /// Directory to watch for new files (default: /share/Scans)
    #[arg(long, alias = "input_dir", value_name = "DIR")]
    pub input_dir: Option<PathBuf>,

    /// Drive folder to upload into (default: "Incoming Scans")
    #[arg(long, alias = "output_dir", value_name = "FOLDER")]
    pub output_dir: Option<String>,

    /// OAuth client secrets file (default: /data/credentials.json)
    #[arg(long, alias = "creds_file", value_name = "FILE")]
    pub creds_file: Option<PathBuf>,

    /// OAuth token cache (default: /data/token.json)
    #[arg(long, alias = "token_file", value_name = "FILE")]
    pub token_file: Option<PathBuf>,

    /// Upload files already in the directory at startup (default: true)
    #[arg(long, alias = "upload_on_startup", value_name = "BOOL", action = ArgAction::Set)]
    pub upload_on_startup: Option<bool>,

    /// Milliseconds between size checks while waiting for a file to settle
    #[arg(long, value_name = "MS")]
    pub poll_interval_ms: Option<u64>,

    /// Config file path (defaults to ~/.config/scanferry/config.toml)
    #[arg(short = 'C', long)]
    pub config: Option<PathBuf>,

    /// Set log level (off, error, warn, info, debug, trace)
    /// If not specified, uses config file value or defaults to 'info'
    #[arg(short = 'l', long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Enable verbose logging (shortcut for --log-level=debug)
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Resolve the effective log level: `--verbose`, then `--log-level`, then
    /// the config file, then `info`.
    pub fn level_filter(&self, configured: Option<LogLevel>) -> LevelFilter {
        if self.verbose {
            return LevelFilter::DEBUG;
        }
        self.log_level
            .or(configured)
            .map(LevelFilter::from)
            .unwrap_or(LevelFilter::INFO)
    }
}
