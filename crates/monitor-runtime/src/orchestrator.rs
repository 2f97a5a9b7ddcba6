//! Async monitoring orchestrator.
//!
//! Walks the registered accounts one at a time through a single
//! [`SessionResource`], diffs each observed following count against the
//! [`AccountStateStore`] and pushes change alerts to a [`NotificationSink`].
//! [`MonitoringOrchestrator::start`] runs the loop in a dedicated tokio task;
//! the returned [`MonitoringHandle`] stops it cooperatively.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use monitor_core::error::{MonitorError, Result};
use monitor_core::models::{ChangeEvent, MonitoredAccount};
use monitor_core::notifications::NotificationSink;
use monitor_core::settings::Settings;
use monitor_data::page_reader::{extract_following_count, extract_latest_followed_name};
use monitor_data::registry::AccountRegistry;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::session::{PageAddress, SessionHandle, SessionResource};
use crate::state_store::AccountStateStore;
use crate::supervisor::{Health, ResilienceSupervisor, SupervisorPolicy};

// ── Public types ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Pause after every account check.
    pub interval: Duration,
    pub policy: SupervisorPolicy,
}

impl MonitorConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            interval: settings.check_interval(),
            policy: SupervisorPolicy {
                failure_ceiling: settings.failure_ceiling,
                rebuild_attempts: settings.rebuild_attempts,
                rebuild_backoff: settings.rebuild_backoff(),
            },
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            policy: SupervisorPolicy::default(),
        }
    }
}

/// What one pass over the registry did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Accounts compared against a known count.
    pub checked: usize,
    /// Accounts observed for the first time.
    pub seeded: usize,
    pub notifications: usize,
    pub failures: usize,
    pub rebuilds: usize,
    /// The cycle ended early because a stop was requested.
    pub stopped: bool,
}

/// How a monitoring run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Stopped,
    Fatal(String),
}

/// Result of checking a single account.
enum AccountCheck {
    Seeded,
    Unchanged,
    Changed,
}

// ── MonitoringOrchestrator ────────────────────────────────────────────────────

pub struct MonitoringOrchestrator {
    session: Arc<dyn SessionResource>,
    registry: Arc<dyn AccountRegistry>,
    sink: Arc<dyn NotificationSink>,
    state: AccountStateStore,
    supervisor: ResilienceSupervisor,
    handle: Option<SessionHandle>,
    /// Set when a best-effort fetch found the session dead.
    session_lost: Option<MonitorError>,
    interval: Duration,
}

impl MonitoringOrchestrator {
    pub fn new(
        session: Arc<dyn SessionResource>,
        registry: Arc<dyn AccountRegistry>,
        sink: Arc<dyn NotificationSink>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            session,
            registry,
            sink,
            state: AccountStateStore::new(),
            supervisor: ResilienceSupervisor::new(config.policy),
            handle: None,
            session_lost: None,
            interval: config.interval,
        }
    }

    pub fn state(&self) -> &AccountStateStore {
        &self.state
    }

    pub fn supervisor(&self) -> &ResilienceSupervisor {
        &self.supervisor
    }

    /// Spawn the monitoring loop on its own task.
    pub fn start(self) -> MonitoringHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(stop_rx));
        MonitoringHandle {
            stop: stop_tx,
            task,
        }
    }

    /// Run cycles until `stop` flips to `true` (or its sender is dropped) or
    /// a fatal condition occurs. The held session is released either way.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) -> RunOutcome {
        tracing::info!(interval_secs = self.interval.as_secs_f32(), "monitoring started");

        let outcome = loop {
            match self.run_cycle(&mut stop).await {
                Ok(report) if report.stopped => break RunOutcome::Stopped,
                Ok(report) => tracing::debug!(?report, "cycle complete"),
                Err(e) => {
                    let reason = match e {
                        MonitorError::Fatal(reason) => reason,
                        other => other.to_string(),
                    };
                    tracing::error!(%reason, "monitoring stopped");
                    self.sink.send(&format!("Monitoring stopped: {reason}"));
                    break RunOutcome::Fatal(reason);
                }
            }
        };

        if let Some(handle) = self.handle.take() {
            self.session.release(handle).await;
        }
        tracing::info!(?outcome, restarts = self.supervisor.restarts(), "monitoring finished");
        outcome
    }

    /// One pass over the registry.
    ///
    /// Only a session that cannot be (re-)established is returned as an
    /// error; per-account failures are absorbed into the report.
    pub async fn run_cycle(&mut self, stop: &mut watch::Receiver<bool>) -> Result<CycleReport> {
        let mut report = CycleReport::default();
        if stop_requested(stop) {
            report.stopped = true;
            return Ok(report);
        }

        self.ensure_session().await?;

        let accounts = match self.registry.list_accounts() {
            Ok(accounts) => accounts,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read the account registry; skipping cycle");
                self.sink.send(&format!("Error in monitoring: {e}"));
                report.stopped = self.pace(stop).await;
                return Ok(report);
            }
        };

        self.reconcile(&accounts);

        if accounts.is_empty() {
            tracing::debug!("no accounts registered");
            report.stopped = self.pace(stop).await;
            return Ok(report);
        }

        for name in &accounts {
            if stop_requested(stop) {
                report.stopped = true;
                return Ok(report);
            }

            let account = MonitoredAccount::new(name.as_str());
            match self.check_account(&account).await {
                Ok(check) => {
                    match self.session_lost.take() {
                        Some(e) => self.note_failure(&e, &mut report).await?,
                        None => self.supervisor.record_success(),
                    }
                    match check {
                        AccountCheck::Seeded => report.seeded += 1,
                        AccountCheck::Unchanged => report.checked += 1,
                        AccountCheck::Changed => {
                            report.checked += 1;
                            report.notifications += 1;
                        }
                    }
                }
                Err(e) => {
                    report.failures += 1;
                    tracing::debug!(account = %name, error = %e, "account check failed");
                    self.note_failure(&e, &mut report).await?;
                }
            }

            if self.pace(stop).await {
                report.stopped = true;
                return Ok(report);
            }
        }

        Ok(report)
    }

    /// Feed `err` to the supervisor and rebuild the session once it degrades.
    async fn note_failure(&mut self, err: &MonitorError, report: &mut CycleReport) -> Result<()> {
        if self.supervisor.record_failure(err) == Health::Degraded {
            let current = self.handle.take();
            let fresh = self
                .supervisor
                .rebuild(self.session.as_ref(), current)
                .await?;
            self.handle = Some(fresh);
            report.rebuilds += 1;
        }
        Ok(())
    }

    /// Acquire a session if none is held. A failure here ends the run.
    async fn ensure_session(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }
        let handle = self
            .session
            .acquire()
            .await
            .map_err(|e| MonitorError::Fatal(format!("could not establish a session: {e}")))?;
        tracing::info!(generation = handle.generation(), "session established");
        self.handle = Some(handle);
        Ok(())
    }

    /// Forget accounts that are no longer registered.
    fn reconcile(&mut self, accounts: &[String]) {
        let registered: HashSet<&str> = accounts.iter().map(String::as_str).collect();
        for stale in self.state.tracked_accounts() {
            if !registered.contains(stale.as_str()) {
                tracing::info!(account = %stale, "account unregistered; dropping its state");
                self.state.remove(&stale);
            }
        }
    }

    async fn check_account(&mut self, account: &MonitoredAccount) -> Result<AccountCheck> {
        let current = self.fetch_count(account).await?;

        let Some(known) = self.state.get(account.name()).map(|s| s.known_count) else {
            tracing::info!(account = %account, count = current, "baseline recorded");
            self.state.set(account.name(), current);
            self.record_count(account, current);
            return Ok(AccountCheck::Seeded);
        };

        let check = match ChangeEvent::between(account, known, current) {
            None => {
                tracing::debug!(account = %account, count = current, "no change");
                AccountCheck::Unchanged
            }
            Some(event) => {
                let event = if current > known {
                    event.with_newest_followed(self.fetch_newest_followed(account).await)
                } else {
                    event
                };
                tracing::info!(
                    account = %account,
                    previous = known,
                    current,
                    kind = ?event.kind,
                    "following count changed"
                );
                self.sink.send(&event.message());
                AccountCheck::Changed
            }
        };

        self.state.set(account.name(), current);
        self.record_count(account, current);
        Ok(check)
    }

    async fn fetch_count(&self, account: &MonitoredAccount) -> Result<u64> {
        let handle = self
            .handle
            .as_ref()
            .ok_or_else(|| MonitorError::Auth("no session held".to_string()))?;
        let markup = self
            .session
            .fetch(handle, &PageAddress::Profile(account.clone()))
            .await?;
        extract_following_count(&markup)
    }

    /// Best effort: any failure yields `None` and a count-only alert. A dead
    /// session is remembered so the supervisor hears about it.
    async fn fetch_newest_followed(&mut self, account: &MonitoredAccount) -> Option<String> {
        let handle = self.handle.as_ref()?;
        match self
            .session
            .fetch(handle, &PageAddress::Following(account.clone()))
            .await
        {
            Ok(markup) => extract_latest_followed_name(&markup),
            Err(e) => {
                tracing::debug!(account = %account, error = %e, "newest follow unavailable");
                if e.is_session_lost() {
                    self.session_lost = Some(e);
                }
                None
            }
        }
    }

    fn record_count(&self, account: &MonitoredAccount, count: u64) {
        match self.registry.upsert_count(account.name(), count) {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(account = %account, "account unregistered mid-check; count not stored");
            }
            Err(e) => {
                tracing::warn!(account = %account, error = %e, "failed to persist following count");
                self.sink.send(&format!("Error updating following count for {account}: {e}"));
            }
        }
    }

    /// Sleep for one interval. Returns `true` when a stop was requested,
    /// which cuts the sleep short.
    async fn pace(&self, stop: &mut watch::Receiver<bool>) -> bool {
        if stop_requested(stop) {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(self.interval) => stop_requested(stop),
            changed = stop.changed() => changed.is_err() || stop_requested(stop),
        }
    }
}

fn stop_requested(stop: &watch::Receiver<bool>) -> bool {
    *stop.borrow() || stop.has_changed().is_err()
}

// ── MonitoringHandle ──────────────────────────────────────────────────────────

/// Handle to a running monitoring task.
pub struct MonitoringHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<RunOutcome>,
}

impl MonitoringHandle {
    /// Ask the loop to finish after the current account.
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the task to end.
    pub async fn join(self) -> RunOutcome {
        let MonitoringHandle { stop: _stop, task } = self;
        match task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => RunOutcome::Stopped,
            Err(e) => RunOutcome::Fatal(format!("monitoring task failed: {e}")),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
