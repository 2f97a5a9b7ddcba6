use serde::{Deserialize, Serialize};
use std::fmt;

/// An external account whose "following" list is being watched.
///
/// The name is opaque and case-sensitive; it is stored without a leading `@`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MonitoredAccount(String);

impl MonitoredAccount {
    /// Wrap a registry name verbatim.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The bare account name, without `@`.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MonitoredAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

impl From<&str> for MonitoredAccount {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Last known "following" count for one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowState {
    pub account: MonitoredAccount,
    pub known_count: u64,
}

/// Direction of a change in a following count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Increase,
    Decrease,
}

/// A computed change in an account's following count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub account: MonitoredAccount,
    pub kind: ChangeKind,
    /// Always strictly positive.
    pub delta: u64,
    pub new_total: u64,
    /// Handle of the most recently followed account, when it could be read.
    pub newest_followed_name: Option<String>,
}

impl ChangeEvent {
    /// Diff `known` against `current`; `None` when the counts are equal.
    pub fn between(account: &MonitoredAccount, known: u64, current: u64) -> Option<Self> {
        let (kind, delta) = match current.cmp(&known) {
            std::cmp::Ordering::Greater => (ChangeKind::Increase, current - known),
            std::cmp::Ordering::Less => (ChangeKind::Decrease, known - current),
            std::cmp::Ordering::Equal => return None,
        };
        Some(Self {
            account: account.clone(),
            kind,
            delta,
            new_total: current,
            newest_followed_name: None,
        })
    }

    /// Attach the newest followed handle. Empty names are ignored.
    pub fn with_newest_followed(mut self, name: Option<String>) -> Self {
        self.newest_followed_name = name.filter(|n| !n.is_empty());
        self
    }

    /// Human-readable alert text for this change.
    pub fn message(&self) -> String {
        match (self.kind, self.newest_followed_name.as_deref()) {
            (ChangeKind::Increase, Some(name)) => {
                format!("{} started following @{}", self.account, name)
            }
            (ChangeKind::Increase, None) => format!(
                "{} started following {} new account(s). Total following: {}",
                self.account, self.delta, self.new_total
            ),
            (ChangeKind::Decrease, _) => format!(
                "{} unfollowed {} account(s). Total following: {}",
                self.account, self.delta, self.new_total
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn watched() -> MonitoredAccount {
        MonitoredAccount::new("watched")
    }

    #[test]
    fn test_account_displays_with_at_prefix() {
        let account = MonitoredAccount::new("Someone");
        assert_eq!(account.name(), "Someone");
        assert_eq!(account.to_string(), "@Someone");
    }

    #[test]
    fn test_account_is_case_sensitive() {
        assert_ne!(MonitoredAccount::new("Bob"), MonitoredAccount::new("bob"));
    }

    #[test]
    fn test_between_equal_counts_is_none() {
        assert!(ChangeEvent::between(&watched(), 100, 100).is_none());
    }

    #[test]
    fn test_between_increase() {
        let event = ChangeEvent::between(&watched(), 100, 105).unwrap();
        assert_eq!(event.kind, ChangeKind::Increase);
        assert_eq!(event.delta, 5);
        assert_eq!(event.new_total, 105);
    }

    #[test]
    fn test_between_decrease() {
        let event = ChangeEvent::between(&watched(), 100, 90).unwrap();
        assert_eq!(event.kind, ChangeKind::Decrease);
        assert_eq!(event.delta, 10);
        assert_eq!(event.new_total, 90);
    }

    #[test]
    fn test_message_increase_with_name() {
        let event = ChangeEvent::between(&watched(), 100, 105)
            .unwrap()
            .with_newest_followed(Some("alice".to_string()));
        assert_eq!(event.message(), "@watched started following @alice");
    }

    #[test]
    fn test_message_increase_without_name() {
        let event = ChangeEvent::between(&watched(), 100, 105).unwrap();
        assert_eq!(
            event.message(),
            "@watched started following 5 new account(s). Total following: 105"
        );
    }

    #[test]
    fn test_message_increase_with_empty_name_falls_back_to_count() {
        let event = ChangeEvent::between(&watched(), 1, 2)
            .unwrap()
            .with_newest_followed(Some(String::new()));
        assert_eq!(
            event.message(),
            "@watched started following 1 new account(s). Total following: 2"
        );
    }

    #[test]
    fn test_message_decrease() {
        let event = ChangeEvent::between(&watched(), 100, 90).unwrap();
        assert_eq!(
            event.message(),
            "@watched unfollowed 10 account(s). Total following: 90"
        );
    }
}
