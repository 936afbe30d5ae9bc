//! One-way operator notifications.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivery failures are logged, never returned.
    async fn notify(&self, text: &str);
}

/// Writes notifications to the log only.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, text: &str) {
        info!(target: "notify", "{text}");
    }
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    disable_web_page_preview: bool,
}

pub struct TelegramNotifier {
    client: reqwest::Client,
    endpoint: String,
    chat_id: i64,
}

impl TelegramNotifier {
    pub fn new(client: reqwest::Client, bot_token: &str, chat_id: i64) -> Self {
        Self {
            client,
            endpoint: format!("https://api.telegram.org/bot{bot_token}/sendMessage"),
            chat_id,
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, text: &str) {
        info!(target: "notify", "{text}");

        let message = SendMessage {
            chat_id: self.chat_id,
            text,
            disable_web_page_preview: true,
        };
        let result = self
            .client
            .post(&self.endpoint)
            .json(&message)
            .send()
            .await
            .and_then(|response| response.error_for_status());

        if let Err(error) = result {
            // never print the endpoint, it carries the bot token
            warn!(error = %error.without_url(), "Failed to send telegram message");
        }
    }
}
