//! Telegram Bot API client, limited to `sendMessage`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::Config;
use crate::constants::USER_AGENT;
use crate::relay::{MessageSink, OutgoingMessage};

pub type Result<T> = std::result::Result<T, TelegramError>;

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Bot API error (status {status}): {description}")]
    Api { status: u16, description: String },
}

/// The request URL carries the bot token, so it is stripped.
impl From<reqwest::Error> for TelegramError {
    fn from(err: reqwest::Error) -> Self {
        TelegramError::Network(err.without_url().to_string())
    }
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_notification: bool,
    disable_web_page_preview: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_thread_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

pub struct TelegramClient {
    client: reqwest::Client,
    endpoint: String,
}

impl TelegramClient {
    /// Create a client for the bot identified by `token`.
    #[must_use]
    pub fn new(base_url: &str, token: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            endpoint: format!("{}/bot{token}", base_url.trim_end_matches('/')),
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.telegram_api_url, &config.telegram_token)
    }

    /// Send one HTML-formatted message.
    pub async fn send_message(&self, message: &OutgoingMessage<'_>) -> Result<()> {
        let request = SendMessageRequest {
            chat_id: message.chat_id,
            text: message.text,
            parse_mode: "HTML",
            disable_notification: message.disable_notification,
            disable_web_page_preview: message.disable_link_preview,
            message_thread_id: message.thread_id,
        };

        let resp = self
            .client
            .post(format!("{}/sendMessage", self.endpoint))
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        let parsed = serde_json::from_str::<ApiResponse>(&body).ok();

        match parsed {
            Some(api) if status.is_success() && api.ok => {
                debug!(chars = message.text.chars().count(), "Message sent");
                Ok(())
            }
            Some(api) => Err(TelegramError::Api {
                status: status.as_u16(),
                description: api.description.unwrap_or(body),
            }),
            None => Err(TelegramError::Api {
                status: status.as_u16(),
                description: body,
            }),
        }
    }
}

#[async_trait]
impl MessageSink for TelegramClient {
    async fn send(&self, message: &OutgoingMessage<'_>) -> anyhow::Result<()> {
        Ok(self.send_message(message).await?)
    }
}
