use monitor_core::error::{MonitorError, Result};
use monitor_core::notifications::NotificationSink;
use tokio::runtime::Handle;

use crate::telegram::TelegramClient;

/// Delivers alerts to one Telegram chat.
///
/// Each `send` spawns its own delivery task on the runtime the notifier was
/// built on, so the monitoring loop never waits for the Bot API. Delivery
/// failures are logged and dropped.
pub struct TelegramNotifier {
    client: TelegramClient,
    chat_id: i64,
    runtime: Handle,
}

impl TelegramNotifier {
    /// Must be called from within a tokio runtime.
    pub fn new(client: TelegramClient, chat_id: i64) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            MonitorError::Config(format!("Telegram notifier needs a tokio runtime: {e}"))
        })?;
        Ok(Self {
            client,
            chat_id,
            runtime,
        })
    }

    pub fn chat_id(&self) -> i64 {
        self.chat_id
    }
}

impl NotificationSink for TelegramNotifier {
    fn send(&self, text: &str) {
        let client = self.client.clone();
        let chat_id = self.chat_id;
        let text = text.to_string();
        self.runtime.spawn(async move {
            if let Err(e) = client.send_message(chat_id, &text).await {
                tracing::error!(chat_id, error = %e, "failed to deliver notification");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use monitor_core::settings::Secret;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_requires_runtime() {
        let client = TelegramClient::new(&Secret::new("t"));
        assert!(TelegramNotifier::new(client, 1).is_err());
    }

    #[tokio::test]
    async fn test_send_delivers_in_background() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bott/sendMessage"))
            .and(body_partial_json(json!({ "chat_id": -5, "text": "@a unfollowed 1 account(s). Total following: 9" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": { "message_id": 1, "chat": { "id": -5, "type": "group" } }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = TelegramClient::new(&Secret::new("t")).with_base_url(server.uri());
        let notifier = TelegramNotifier::new(client, -5).unwrap();
        notifier.send("@a unfollowed 1 account(s). Total following: 9");

        for _ in 0..100 {
            if !server.received_requests().await.unwrap_or_default().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_delivery_failure_is_swallowed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "ok": false })))
            .mount(&server)
            .await;

        let client = TelegramClient::new(&Secret::new("t")).with_base_url(server.uri());
        let notifier = TelegramNotifier::new(client, -5).unwrap();
        notifier.send("boom");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
