pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

use crate::commands::CommandSpec;

/// Webhook update envelope. Only the fields the router needs are modelled.
#[derive(Debug, Deserialize)]
pub struct Update {
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub edited_message: Option<Message>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub chat: Option<Chat>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// A text message received from the chat platform
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    /// Chat the reply goes back to
    pub chat_id: i64,
    /// Trimmed message text, never empty
    pub text: String,
    /// Whether this came in as an edit of an earlier message
    pub edited: bool,
}

impl Update {
    /// The usable text message in this update, if there is one.
    pub fn into_incoming(self) -> Option<IncomingMessage> {
        let (message, edited) = match (self.message, self.edited_message) {
            (Some(message), _) => (message, false),
            (None, Some(message)) => (message, true),
            (None, None) => return None,
        };

        let chat = message.chat?;
        let text = message.text?.trim().to_string();
        if text.is_empty() {
            return None;
        }

        Some(IncomingMessage {
            chat_id: chat.id,
            text,
            edited,
        })
    }
}

/// Outbound side of the chat platform.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send an HTML-formatted message with link previews disabled.
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()>;

    /// Publish the command menu and return the platform's answer as JSON.
    async fn register_commands(&self, commands: &[CommandSpec]) -> Result<serde_json::Value>;
}
