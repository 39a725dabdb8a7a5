use clap::Parser;
use scanferry_cli::app::{connect_drive, exit_codes, shutdown_signal};
use scanferry_cli::cli::Cli;
use scanferry_cli::config::CliConfig;
use scanferry_watch::Uploader;
use std::process;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = CliConfig::load(&cli);

    // Initialize logging
    let level = cli.level_filter(config.as_ref().ok().and_then(|c| c.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .init();

    info!("Starting scanferry v{}", env!("CARGO_PKG_VERSION"));

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            process::exit(exit_codes::CONFIG_ERROR);
        }
    };
    if let Err(e) = config.uploader.validate() {
        error!("Invalid configuration: {}", e);
        process::exit(exit_codes::CONFIG_ERROR);
    }
    if let Ok(text) = config.display_as_toml() {
        debug!("Effective configuration:\n{}", text);
    }

    let store = match connect_drive(&config.drive).await {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to connect to Google Drive: {:#}", e);
            process::exit(exit_codes::SETUP_ERROR);
        }
    };

    let mut uploader = match Uploader::new(config.uploader.clone(), Arc::new(store)).await {
        Ok(uploader) => uploader,
        Err(e) => {
            error!("Failed to create uploader: {}", e);
            process::exit(exit_codes::SETUP_ERROR);
        }
    };

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_cancel.cancel();
    });

    let result = uploader.run(cancel.clone()).await;
    cancel.cancel();
    uploader.close();

    match result {
        Ok(()) => {
            info!("Event source closed, exiting");
            process::exit(exit_codes::SUCCESS);
        }
        Err(e) if e.is_cancelled() => {
            info!("Shutting down");
            process::exit(exit_codes::SUCCESS);
        }
        Err(e) => {
            error!("Uploader stopped: {}", e);
            process::exit(exit_codes::RUN_ERROR);
        }
    }
}
