//! Failure accounting and session rebuild policy.

use std::time::Duration;

use monitor_core::error::{MonitorError, Result};

use crate::session::{SessionHandle, SessionResource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Healthy,
    /// The consecutive-failure ceiling was reached; the session must be
    /// rebuilt before the next account is processed.
    Degraded,
}

#[derive(Debug, Clone)]
pub struct SupervisorPolicy {
    /// Consecutive failures tolerated before a rebuild.
    pub failure_ceiling: u32,
    /// Acquisition attempts per rebuild.
    pub rebuild_attempts: u32,
    /// Base delay between attempts; attempt `n` waits `n * rebuild_backoff`.
    pub rebuild_backoff: Duration,
}

impl Default for SupervisorPolicy {
    fn default() -> Self {
        Self {
            failure_ceiling: 5,
            rebuild_attempts: 3,
            rebuild_backoff: Duration::from_secs(10),
        }
    }
}

/// Tracks consecutive failures and decides when to rebuild the session.
#[derive(Debug)]
pub struct ResilienceSupervisor {
    policy: SupervisorPolicy,
    consecutive_failures: u32,
    restarts: u32,
}

impl ResilienceSupervisor {
    pub fn new(policy: SupervisorPolicy) -> Self {
        Self {
            policy,
            consecutive_failures: 0,
            restarts: 0,
        }
    }

    pub fn health(&self) -> Health {
        if self.consecutive_failures >= self.policy.failure_ceiling.max(1) {
            Health::Degraded
        } else {
            Health::Healthy
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Number of successful rebuilds so far.
    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Count one failed account check.
    ///
    /// An error proving the session is dead degrades health at once instead
    /// of waiting for the ceiling.
    pub fn record_failure(&mut self, err: &MonitorError) -> Health {
        if err.is_session_lost() {
            self.consecutive_failures = self.consecutive_failures.max(self.policy.failure_ceiling.max(1));
        } else {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        }
        let health = self.health();
        tracing::warn!(
            error = %err,
            consecutive_failures = self.consecutive_failures,
            ceiling = self.policy.failure_ceiling,
            ?health,
            "account check failed"
        );
        health
    }

    /// Release `current` and acquire a replacement session.
    ///
    /// Tries up to `rebuild_attempts` times with linearly growing backoff.
    /// On success the failure counter resets; once every attempt fails the
    /// result is [`MonitorError::Fatal`].
    pub async fn rebuild(
        &mut self,
        session: &dyn SessionResource,
        current: Option<SessionHandle>,
    ) -> Result<SessionHandle> {
        if let Some(handle) = current {
            session.release(handle).await;
        }

        let attempts = self.policy.rebuild_attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            tracing::info!(attempt, attempts, "rebuilding session");
            match session.acquire().await {
                Ok(handle) => {
                    self.consecutive_failures = 0;
                    self.restarts += 1;
                    tracing::info!(
                        generation = handle.generation(),
                        restarts = self.restarts,
                        "session rebuilt"
                    );
                    return Ok(handle);
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "session rebuild attempt failed");
                    last_error = Some(e);
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.policy.rebuild_backoff * attempt).await;
            }
        }

        let reason = last_error.map_or_else(|| "no attempt made".to_string(), |e| e.to_string());
        Err(MonitorError::Fatal(format!(
            "could not re-establish the session after {attempts} attempts: {reason}"
        )))
    }
}
