//! In-memory follow state.
//!
//! Written only by the monitoring task, so it needs no locking. Membership
//! reconciliation against the registry is the orchestrator's job; this store
//! only exposes get/set/remove.

use std::collections::{BTreeSet, HashMap};

use monitor_core::models::{FollowState, MonitoredAccount};

#[derive(Debug, Default)]
pub struct AccountStateStore {
    states: HashMap<String, FollowState>,
}

impl AccountStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, account: &str) -> Option<&FollowState> {
        self.states.get(account)
    }

    /// Record `count` as the latest known count for `account`.
    pub fn set(&mut self, account: &str, count: u64) {
        self.states.insert(
            account.to_string(),
            FollowState {
                account: MonitoredAccount::new(account),
                known_count: count,
            },
        );
    }

    /// Forget `account`; its next observation will be a silent baseline.
    pub fn remove(&mut self, account: &str) -> Option<FollowState> {
        self.states.remove(account)
    }

    pub fn tracked_accounts(&self) -> BTreeSet<String> {
        self.states.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
