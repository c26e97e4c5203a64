use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use crate::balance::BalanceClient;
use crate::commands::Command;
use crate::config::{Config, ConfigError};
use crate::github::GithubClient;
use crate::handlers;
use crate::platform::{Messenger, Update};

pub const UNAUTHORIZED_TEXT: &str = "⛔ You are not authorized to use this bot.";

/// Everything a webhook delivery needs. Built once at startup and only read
/// afterwards, so concurrent deliveries share it without locking.
pub struct AppState {
    pub config: Config,
    pub messenger: Arc<dyn Messenger>,
    pub balance: BalanceClient,
    github: Result<GithubClient, ConfigError>,
}

impl AppState {
    pub fn new(config: Config, messenger: Arc<dyn Messenger>) -> Self {
        let http = reqwest::Client::new();
        let github = GithubClient::new(http.clone(), &config.github);
        if let Err(e) = &github {
            warn!("GitHub integration disabled: {}", e);
        }
        let balance = BalanceClient::new(http, config.balance.quota_divisor);

        Self {
            config,
            messenger,
            balance,
            github,
        }
    }

    pub fn github(&self) -> Result<&GithubClient, &ConfigError> {
        self.github.as_ref()
    }
}

/// Process one webhook body: authorize the sender, run the command, reply.
///
/// Only an unreadable body is an error; everything else is answered in chat
/// or ignored.
pub async fn handle_update(state: &AppState, body: &[u8]) -> Result<()> {
    let update: Update = serde_json::from_slice(body).context("Failed to parse webhook body")?;

    let Some(incoming) = update.into_incoming() else {
        debug!("Update has no text message, nothing to do");
        return Ok(());
    };

    info!(
        chat_id = incoming.chat_id,
        edited = incoming.edited,
        "Message received"
    );

    if !state.config.telegram.is_allowed(incoming.chat_id) {
        warn!(chat_id = incoming.chat_id, "Chat is not on the allow-list");
        reply(state, incoming.chat_id, UNAUTHORIZED_TEXT).await;
        return Ok(());
    }

    let Some(command) = Command::parse(&incoming.text) else {
        debug!("Ignoring plain chat text");
        return Ok(());
    };

    info!(?command, "Dispatching command");
    let text = handlers::dispatch(state, command).await;
    if !text.is_empty() {
        reply(state, incoming.chat_id, &text).await;
    }

    Ok(())
}

/// Best-effort send; a failed reply never fails the delivery.
async fn reply(state: &AppState, chat_id: i64, text: &str) {
    if let Err(e) = state.messenger.send_text(chat_id, text).await {
        error!("Failed to send reply to {}: {:#}", chat_id, e);
    }
}
