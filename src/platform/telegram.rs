use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use teloxide::payloads::SendMessageSetters;
use teloxide::requests::Requester;
use teloxide::types::{BotCommand, ChatId, LinkPreviewOptions, ParseMode};
use teloxide::{ApiError, Bot, RequestError};
use tracing::{debug, info, warn};

use crate::commands::CommandSpec;
use crate::config::TelegramConfig;

use super::Messenger;

/// Telegram rejects messages over 4096 characters; stay below it.
const MAX_MESSAGE_LEN: usize = 4000;

/// Split long replies at line (or word) boundaries so HTML tags stay intact
/// on ordinary multi-line reports.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.chars().count() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut rest = text;

    while !rest.is_empty() {
        let end = rest
            .char_indices()
            .nth(max_len)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let cut = if end < rest.len() {
            rest[..end]
                .rfind('\n')
                .or_else(|| rest[..end].rfind(' '))
                .map(|pos| pos + 1)
                .unwrap_or(end)
        } else {
            end
        };

        let chunk = rest[..cut].trim_end_matches('\n');
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }
        rest = &rest[cut..];
    }

    chunks
}

fn no_link_preview() -> LinkPreviewOptions {
    LinkPreviewOptions {
        is_disabled: true,
        url: None,
        prefer_small_media: false,
        prefer_large_media: false,
        show_above_text: false,
    }
}

/// Telegram Bot API messenger. Without a bot token every send fails, which
/// the router logs and otherwise ignores.
pub struct TelegramMessenger {
    bot: Option<Bot>,
}

impl TelegramMessenger {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let bot = match config.bot_token() {
            Ok(token) => {
                let api_url = reqwest::Url::parse(&config.api_url)
                    .with_context(|| format!("Invalid Telegram API URL: {}", config.api_url))?;
                Some(Bot::new(token).set_api_url(api_url))
            }
            Err(e) => {
                warn!("{}; replies will not be delivered", e);
                None
            }
        };
        Ok(Self { bot })
    }

    fn bot(&self) -> Result<&Bot> {
        self.bot
            .as_ref()
            .context("Telegram bot token is not configured")
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        let bot = self.bot()?;

        for chunk in split_message(text, MAX_MESSAGE_LEN) {
            bot.send_message(ChatId(chat_id), chunk)
                .parse_mode(ParseMode::Html)
                .link_preview_options(no_link_preview())
                .await
                .with_context(|| format!("sendMessage to {} failed", chat_id))?;
        }

        debug!("Reply delivered to {}", chat_id);
        Ok(())
    }

    async fn register_commands(&self, commands: &[CommandSpec]) -> Result<serde_json::Value> {
        let bot = self.bot()?;
        let menu: Vec<BotCommand> = commands
            .iter()
            .map(|c| BotCommand::new(c.name, c.description))
            .collect();

        match bot.set_my_commands(menu).await {
            Ok(_) => {
                info!("Registered {} bot commands", commands.len());
                Ok(json!({"ok": true, "result": true}))
            }
            Err(RequestError::Api(err)) => {
                warn!("setMyCommands rejected: {}", err);
                let description = match err {
                    ApiError::Unknown(text) => text,
                    known => known.to_string(),
                };
                Ok(json!({"ok": false, "description": description}))
            }
            Err(e) => Err(e).context("setMyCommands failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    use crate::commands::COMMANDS;

    fn messenger_for(server: &MockServer) -> TelegramMessenger {
        let config = TelegramConfig {
            bot_token: Some("123:abc".to_string()),
            api_url: server.uri(),
            ..TelegramConfig::default()
        };
        TelegramMessenger::new(&config).unwrap()
    }

    fn sent_message(chat_id: i64, text: &str) -> serde_json::Value {
        json!({
            "ok": true,
            "result": {
                "message_id": 7,
                "from": {"id": 123, "is_bot": true, "first_name": "relay"},
                "chat": {"id": chat_id, "first_name": "user", "type": "private"},
                "date": 1736121600,
                "text": text
            }
        })
    }

    #[tokio::test]
    async fn test_send_text_uses_html_without_previews() {
        let server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/bot123:abc/SendMessage"))
            .and(matchers::body_partial_json(json!({
                "chat_id": 5,
                "text": "<b>hi</b>",
                "parse_mode": "HTML",
                "link_preview_options": {"is_disabled": true}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(sent_message(5, "hi")))
            .expect(1)
            .mount(&server)
            .await;

        messenger_for(&server).send_text(5, "<b>hi</b>").await.unwrap();
    }

    #[tokio::test]
    async fn test_send_text_splits_long_replies() {
        let server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/bot123:abc/SendMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sent_message(5, "chunk")))
            .expect(2)
            .mount(&server)
            .await;

        let line = "x".repeat(100);
        let text = vec![line; 50].join("\n");
        messenger_for(&server).send_text(5, &text).await.unwrap();
    }

    #[tokio::test]
    async fn test_send_text_surfaces_api_errors() {
        let server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/bot123:abc/SendMessage"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: chat not found"
            })))
            .mount(&server)
            .await;

        assert!(messenger_for(&server).send_text(5, "hi").await.is_err());
    }

    #[tokio::test]
    async fn test_register_commands_success() {
        let server = MockServer::start().await;

        let menu: Vec<serde_json::Value> = COMMANDS
            .iter()
            .map(|c| json!({"command": c.name, "description": c.description}))
            .collect();
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/bot123:abc/SetMyCommands"))
            .and(matchers::body_partial_json(json!({"commands": menu})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": true})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let result = messenger_for(&server)
            .register_commands(COMMANDS)
            .await
            .unwrap();
        assert_eq!(result, json!({"ok": true, "result": true}));
    }

    #[tokio::test]
    async fn test_register_commands_rejection_keeps_description() {
        let server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/bot123:abc/SetMyCommands"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: command is invalid"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = messenger_for(&server)
            .register_commands(COMMANDS)
            .await
            .unwrap();
        assert_eq!(
            result,
            json!({"ok": false, "description": "Bad Request: command is invalid"})
        );
    }

    #[tokio::test]
    async fn test_register_commands_transport_failure_is_error() {
        let config = TelegramConfig {
            bot_token: Some("123:abc".to_string()),
            api_url: "http://127.0.0.1:9".to_string(),
            ..TelegramConfig::default()
        };
        let messenger = TelegramMessenger::new(&config).unwrap();
        assert!(messenger.register_commands(COMMANDS).await.is_err());
    }

    #[test]
    fn test_short_message_untouched() {
        assert_eq!(split_message("hello", 10), vec!["hello".to_string()]);
    }

    #[test]
    fn test_split_prefers_line_breaks() {
        let text = "line one\nline two\nline three";
        let chunks = split_message(text, 12);
        assert_eq!(chunks, vec!["line one", "line two", "line three"]);
    }

    #[test]
    fn test_split_counts_characters_not_bytes() {
        let text = "✅".repeat(6);
        let chunks = split_message(&text, 4);
        assert_eq!(chunks, vec!["✅✅✅✅".to_string(), "✅✅".to_string()]);
    }

    #[test]
    fn test_split_without_breaks_is_hard_cut() {
        let chunks = split_message("abcdefghij", 4);
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_messenger_without_token() {
        let messenger = TelegramMessenger::new(&TelegramConfig::default()).unwrap();
        assert!(messenger.bot().is_err());
    }

    #[test]
    fn test_messenger_rejects_bad_api_url() {
        let config = TelegramConfig {
            bot_token: Some("123:abc".to_string()),
            api_url: "not a url".to_string(),
            ..TelegramConfig::default()
        };
        assert!(TelegramMessenger::new(&config).is_err());
    }
}
