//! Telegram command front end.
//!
//! Lets authorized group members manage the account registry and start or
//! stop the monitoring loop. Alerts from a run go to the chat that started it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use monitor_core::error::Result;
use monitor_core::notifications::NotificationSink;
use monitor_data::registry::AccountRegistry;
use monitor_runtime::orchestrator::{MonitorConfig, MonitoringHandle, MonitoringOrchestrator};
use monitor_runtime::session::SessionResource;

use crate::commands::{Authorizer, Command};
use crate::telegram::{Message, TelegramClient};

/// Builds the session a new monitoring run will use.
pub type SessionFactory = Box<dyn Fn() -> Result<Arc<dyn SessionResource>> + Send + Sync>;

/// Builds the alert sink bound to the given chat.
pub type SinkFactory = Box<dyn Fn(i64) -> Result<Arc<dyn NotificationSink>> + Send + Sync>;

const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

pub struct CommandBot {
    registry: Arc<dyn AccountRegistry>,
    authorizer: Authorizer,
    config: MonitorConfig,
    sessions: SessionFactory,
    sinks: SinkFactory,
    running: Option<MonitoringHandle>,
    chat_id: Option<i64>,
    poll_timeout: Duration,
}

impl CommandBot {
    pub fn new(
        registry: Arc<dyn AccountRegistry>,
        authorizer: Authorizer,
        config: MonitorConfig,
        sessions: SessionFactory,
        sinks: SinkFactory,
    ) -> Self {
        Self {
            registry,
            authorizer,
            config,
            sessions,
            sinks,
            running: None,
            chat_id: None,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// `true` while a monitoring run is live.
    pub fn is_monitoring(&self) -> bool {
        self.running.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Chat the current (or last) run reports to.
    pub fn chat_id(&self) -> Option<i64> {
        self.chat_id
    }

    /// Reply for `message`, or `None` when it is not a command for this bot.
    pub fn handle_message(&mut self, message: &Message) -> Option<String> {
        let command = Command::parse(message.text.as_deref()?)?;

        let verdict = self.authorizer.check(&message.chat, message.from.as_ref());
        if let Some(rejection) = verdict.rejection() {
            tracing::info!(
                chat_id = message.chat.id,
                user = ?message.from.as_ref().and_then(|u| u.username.as_deref()),
                ?verdict,
                "command refused"
            );
            return Some(rejection.to_string());
        }

        tracing::debug!(chat_id = message.chat.id, ?command, "handling command");
        let reply = match command {
            Command::Start => self.start(message.chat.id),
            Command::Stop => self.stop(),
            Command::AddUser(names) => self.add_users(&names),
            Command::RemoveUser(names) => self.remove_users(&names),
            Command::ListUsers => self.list_users(),
            Command::GetFollowing(name) => self.get_following(name.as_deref()),
        };
        Some(reply)
    }

    /// Long-poll for commands until `shutdown` resolves, then stop any
    /// running monitor.
    pub async fn run<F>(mut self, client: TelegramClient, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut offset = 0_i64;
        tracing::info!("command bot polling for updates");

        loop {
            let polled = tokio::select! {
                _ = &mut shutdown => break,
                polled = client.get_updates(offset, self.poll_timeout) => polled,
            };

            let updates = match polled {
                Ok(updates) => updates,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to poll for updates");
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = tokio::time::sleep(POLL_RETRY_DELAY) => continue,
                    }
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);
                let Some(message) = update.message else {
                    continue;
                };
                if let Some(reply) = self.handle_message(&message) {
                    if let Err(e) = client.send_message(message.chat.id, &reply).await {
                        tracing::warn!(chat_id = message.chat.id, error = %e, "failed to send reply");
                    }
                }
            }
        }

        self.shutdown().await;
    }

    /// Stop a live run and wait for it to release its session.
    pub async fn shutdown(&mut self) {
        if let Some(handle) = self.running.take() {
            handle.stop();
            let outcome = handle.join().await;
            tracing::info!(?outcome, "monitoring run finished");
        }
    }

    // ── Handlers ──────────────────────────────────────────────────────────

    fn start(&mut self, chat_id: i64) -> String {
        self.chat_id = Some(chat_id);

        if self.is_monitoring() {
            return "Monitoring is already running!".to_string();
        }

        match self.registry.list_accounts() {
            Ok(accounts) if accounts.is_empty() => {
                return "No users to monitor! Add users with /add_user username".to_string();
            }
            Ok(_) => {}
            Err(e) => return format!("Failed to start monitoring: {e}"),
        }

        let (session, sink) = match self.prepare_run(chat_id) {
            Ok(parts) => parts,
            Err(e) => {
                tracing::error!(error = %e, "could not prepare a monitoring run");
                return format!("Failed to start monitoring: {e}");
            }
        };

        let orchestrator =
            MonitoringOrchestrator::new(session, self.registry.clone(), sink, self.config.clone());
        self.running = Some(orchestrator.start());
        tracing::info!(chat_id, "monitoring started from chat");
        "Started monitoring Twitter followers!".to_string()
    }

    fn prepare_run(
        &self,
        chat_id: i64,
    ) -> Result<(Arc<dyn SessionResource>, Arc<dyn NotificationSink>)> {
        let session = (self.sessions)()?;
        let sink = (self.sinks)(chat_id)?;
        Ok((session, sink))
    }

    fn stop(&mut self) -> String {
        match self.running.take() {
            Some(handle) if !handle.is_finished() => {
                handle.stop();
                tokio::spawn(async move {
                    let outcome = handle.join().await;
                    tracing::info!(?outcome, "monitoring run finished");
                });
                "Stopped monitoring Twitter followers!".to_string()
            }
            _ => "Monitoring is not running!".to_string(),
        }
    }

    fn add_users(&self, names: &[String]) -> String {
        if names.is_empty() {
            return "Please provide one or more usernames!".to_string();
        }

        let mut added = Vec::new();
        let mut failed = Vec::new();
        for name in names {
            match self.registry.add_account(name) {
                Ok(_) => added.push(name.as_str()),
                Err(e) => {
                    tracing::warn!(account = %name, error = %e, "failed to add account");
                    failed.push(name.as_str());
                }
            }
        }

        let mut lines = Vec::new();
        if !added.is_empty() {
            lines.push(format!("Added users: {}", mention_list(&added)));
        }
        if !failed.is_empty() {
            lines.push(format!("Failed to add users: {}", mention_list(&failed)));
        }
        if lines.is_empty() {
            lines.push("No users were added".to_string());
        }
        lines.join("\n")
    }

    fn remove_users(&self, names: &[String]) -> String {
        if names.is_empty() {
            return "Please provide one or more usernames!".to_string();
        }

        let existing = match self.registry.list_accounts() {
            Ok(existing) => existing,
            Err(e) => return format!("Failed to remove users: {e}"),
        };
        if let Some(unknown) = names.iter().find(|n| !existing.contains(n)) {
            return format!("User @{unknown} does not exist in the database.");
        }

        let mut removed = Vec::new();
        let mut failed = Vec::new();
        for name in names {
            match self.registry.remove_account(name) {
                Ok(true) => removed.push(name.as_str()),
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(account = %name, error = %e, "failed to remove account");
                    failed.push(name.as_str());
                }
            }
        }

        let mut lines = Vec::new();
        if !removed.is_empty() {
            lines.push(format!("Removed users: {}", mention_list(&removed)));
        }
        if !failed.is_empty() {
            lines.push(format!("Failed to remove users: {}", mention_list(&failed)));
        }
        if lines.is_empty() {
            lines.push("No users were removed".to_string());
        }
        lines.join("\n")
    }

    fn list_users(&self) -> String {
        match self.registry.list_accounts() {
            Ok(accounts) if accounts.is_empty() => "No users are being monitored!".to_string(),
            Ok(accounts) => {
                let lines: Vec<String> = accounts.iter().map(|a| format!("@{a}")).collect();
                format!("Monitored users:\n{}", lines.join("\n"))
            }
            Err(e) => format!("Failed to list users: {e}"),
        }
    }

    fn get_following(&self, name: Option<&str>) -> String {
        let Some(name) = name else {
            return "Please provide a username!".to_string();
        };
        match self.registry.following_count(name) {
            Ok(Some(count)) => format!("@{name} is currently following {count} accounts"),
            Ok(None) => format!(
                "No following count available for @{name}. \
                 User might not be monitored or data hasn't been collected yet."
            ),
            Err(e) => format!("Error getting following count: {e}"),
        }
    }
}

fn mention_list(names: &[&str]) -> String {
    names
        .iter()
        .map(|n| format!("@{n}"))
        .collect::<Vec<_>>()
        .join(", ")
}

// ── Tests ─────────────────────────────────────────────────────────────────────
