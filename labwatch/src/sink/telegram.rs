use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;
use time::macros::format_description;

use super::SinkError;
use crate::tracing::prelude::*;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Credentials left in a sample `.env` by mistake.
const PLACEHOLDER_TOKEN: &str = "YOUR_TELEGRAM_BOT_TOKEN";

/// Upper bound on the error body we keep for logging.
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    /// Appended to every message so readers know which room fired.
    pub location: String,
    pub api_base: String,
    pub timeout: Duration,
}

impl TelegramConfig {
    /// Whether the credentials look usable.
    pub fn is_configured(&self) -> bool {
        !self.bot_token.is_empty() && !self.chat_id.is_empty() && self.bot_token != PLACEHOLDER_TOKEN
    }
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

/// Sends notifications through the Telegram Bot API.
pub struct TelegramNotifier {
    client: reqwest::Client,
    url: String,
    config: TelegramConfig,
}

impl TelegramNotifier {
    /// Returns `None` if the credentials are missing or placeholders.
    pub fn new(config: TelegramConfig) -> Result<Option<Self>, SinkError> {
        if !config.is_configured() {
            return Ok(None);
        }

        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        let url = format!(
            "{}/bot{}/sendMessage",
            config.api_base.trim_end_matches('/'),
            config.bot_token
        );
        Ok(Some(Self {
            client,
            url,
            config,
        }))
    }

    pub async fn send(&self, title: &str, body: &str) -> Result<(), SinkError> {
        let text = format_message(title, body, &self.config.location, &local_time());
        let request = SendMessage {
            chat_id: &self.config.chat_id,
            text: &text,
            parse_mode: "Markdown",
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SinkError::Timeout(self.config.timeout)
                } else {
                    SinkError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            body.truncate(floor_char_boundary(&body, MAX_ERROR_BODY));
            return Err(SinkError::Status {
                status: status.as_u16(),
                body,
            });
        }

        debug!(title, "Telegram message delivered");
        Ok(())
    }
}

fn format_message(title: &str, body: &str, location: &str, time: &str) -> String {
    format!("{title}\n\n{body}\n\n📍 Location: {location}\n🕐 Time: {time}")
}

fn local_time() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second]"
    ))
    .unwrap_or_else(|_| now.to_string())
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    if s.len() <= max {
        return s.len();
    }
    (0..=max).rev().find(|i| s.is_char_boundary(*i)).unwrap_or(0)
}
