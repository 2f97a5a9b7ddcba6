//! Minimal Telegram Bot API client: long-polling and plain-text replies.

use std::time::Duration;

use monitor_core::error::{MonitorError, Result};
use monitor_core::settings::Secret;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

const BASE_URL: &str = "https://api.telegram.org";

/// Slack added on top of the long-poll timeout for the HTTP round-trip.
const POLL_GRACE: Duration = Duration::from_secs(10);

// ── Wire types ────────────────────────────────────────────────────────────────

/// `{"ok": ..., "result": ...}` envelope wrapping every Bot API response.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    /// `private`, `group`, `supergroup` or `channel`.
    #[serde(rename = "type")]
    pub kind: String,
}

impl Chat {
    pub fn is_group(&self) -> bool {
        matches!(self.kind.as_str(), "group" | "supergroup")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: Option<String>,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
}

// ── TelegramClient ────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct TelegramClient {
    client: reqwest::Client,
    token: Secret,
    base_url: String,
}

impl TelegramClient {
    pub fn new(token: &Secret) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: token.clone(),
            base_url: BASE_URL.to_string(),
        }
    }

    /// Point the client at another Bot API server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        let _: Message = self
            .call("sendMessage", &SendMessage { chat_id, text }, None)
            .await?;
        Ok(())
    }

    /// Long-poll for updates newer than `offset`.
    pub async fn get_updates(&self, offset: i64, timeout: Duration) -> Result<Vec<Update>> {
        let body = json!({
            "offset": offset,
            "timeout": timeout.as_secs(),
            "allowed_updates": ["message"],
        });
        self.call("getUpdates", &body, Some(timeout + POLL_GRACE)).await
    }

    async fn call<B, T>(&self, method: &str, body: &B, timeout: Option<Duration>) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}/bot{}/{}", self.base_url, self.token.expose(), method);
        let mut request = self.client.post(&url).json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        // The request URL embeds the token; strip it from transport errors.
        let resp = request
            .send()
            .await
            .map_err(|e| MonitorError::Telegram(format!("{method}: {}", e.without_url())))?;
        let status = resp.status();
        let envelope: ApiResponse<T> = resp
            .json()
            .await
            .map_err(|e| MonitorError::Telegram(format!("{method}: {}", e.without_url())))?;

        match envelope {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse { description, .. } => Err(MonitorError::Telegram(format!(
                "{method} failed ({}): {}",
                status.as_u16(),
                description.unwrap_or_else(|| "no description".to_string())
            ))),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
