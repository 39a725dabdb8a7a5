//! Startup helpers shared by the binary and its tests.

use crate::config::DriveConfig;
use anyhow::{Context, Result};
use scanferry_drive::{ClientSecrets, DriveStore, OAuthCredentials, TokenCache};
use std::sync::Arc;
use tracing::info;

/// Exit codes for different scenarios
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const CONFIG_ERROR: i32 = 1;
    pub const SETUP_ERROR: i32 = 2;
    pub const RUN_ERROR: i32 = 3;
}

/// Build an authorized Drive store from `config`.
///
/// Runs the interactive authorization on the terminal when the token file
/// does not exist yet.
pub async fn connect_drive(config: &DriveConfig) -> Result<DriveStore> {
    let secrets = ClientSecrets::from_file(&config.creds_file)
        .context("Unable to read client secret file")?;
    let credentials = OAuthCredentials::new(
        reqwest::Client::new(),
        secrets,
        TokenCache::new(&config.token_file),
    )
    .context("Unable to load cached token")?;

    if !credentials.has_token().await {
        info!(path = %config.token_file.display(), "No cached token, starting authorization");
    }
    credentials
        .ensure_authorized()
        .await
        .context("Unable to retrieve token from web")?;

    let mut store = DriveStore::new(Arc::new(credentials)).context("Unable to create Drive client")?;
    if let Some(base_url) = &config.base_url {
        store = store.with_base_url(base_url.clone());
    }
    if let Some(chunk_size) = config.chunk_size {
        store = store.with_chunk_size(chunk_size);
    }
    Ok(store)
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
