mod balance;
mod bot;
mod commands;
mod config;
mod format;
mod github;
mod handlers;
mod platform;
mod server;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::AppState;
use crate::config::Config;
use crate::platform::telegram::TelegramMessenger;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,checkin_relay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // A config file path wins over the environment
    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Config::load(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?
        }
        None => {
            info!("Loading configuration from environment");
            Config::from_env().context("Invalid configuration in environment")?
        }
    };

    info!("Configuration loaded successfully");
    info!("  Status mode: {}", config.status.mode);
    info!("  Allowed chats: {:?}", config.telegram.allow_list());
    info!(
        "  Webhook secret: {}",
        if config.telegram.webhook_secret().is_some() { "set" } else { "not set" }
    );
    info!(
        "  Accounts: {}",
        config.accounts.as_ref().map_or(0, Vec::len)
    );

    let messenger = Arc::new(TelegramMessenger::new(&config.telegram)?);
    let listen_addr = config.server.listen_addr.clone();
    let state = Arc::new(AppState::new(config, messenger));

    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("Failed to bind to {listen_addr}"))?;
    info!("Webhook server listening on {}", listen_addr);

    axum::serve(listener, server::router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("Server error")?;

    Ok(())
}
