//! Durable registry of monitored accounts.
//!
//! The registry is the source of truth for *which* accounts are monitored. It
//! also records the last count the monitor computed for each account, which
//! the chat front end reads back for `/get_following`; the monitoring loop
//! itself never diffs against these stored counts.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use monitor_core::error::{MonitorError, Result};
use serde::{Deserialize, Serialize};

// ── AccountRegistry ───────────────────────────────────────────────────────────

/// Keyed store of monitored account names and their last recorded counts.
///
/// Shared between the command front end and the monitoring loop, so every
/// implementation must be safe for concurrent use.
pub trait AccountRegistry: Send + Sync {
    /// All registered names, in enumeration order.
    fn list_accounts(&self) -> Result<Vec<String>>;

    /// Record `count` as the latest computed count for `name`.
    ///
    /// Only registered names are updated; an unknown name is left unknown and
    /// `false` is returned.
    fn upsert_count(&self, name: &str, count: u64) -> Result<bool>;

    /// Register `name`. Returns `false` when it was already registered.
    fn add_account(&self, name: &str) -> Result<bool>;

    /// Unregister `name`. Returns `false` when it was not registered.
    fn remove_account(&self, name: &str) -> Result<bool>;

    /// Last recorded count for `name`; `None` when unknown or never counted.
    fn following_count(&self, name: &str) -> Result<Option<u64>>;
}

// ── On-disk document ──────────────────────────────────────────────────────────

/// One registered account as persisted on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub username: String,
    #[serde(default)]
    pub following_count: Option<u64>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl RegistryEntry {
    fn new(username: &str) -> Self {
        Self {
            username: username.to_string(),
            following_count: None,
            last_updated: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RegistryDocument {
    #[serde(default)]
    accounts: Vec<RegistryEntry>,
}

impl RegistryDocument {
    fn position(&self, name: &str) -> Option<usize> {
        self.accounts.iter().position(|e| e.username == name)
    }
}

// ── FileRegistry ──────────────────────────────────────────────────────────────

/// JSON-file backed registry.
///
/// All access goes through one mutex; every write produces a complete new
/// document that is written to a temp file and renamed over the old one, so a
/// crash never leaves a half-written registry behind. Enumeration order is
/// insertion order.
pub struct FileRegistry {
    path: PathBuf,
    document: Mutex<RegistryDocument>,
}

impl FileRegistry {
    /// Open the registry at `path`, starting empty when the file is absent.
    ///
    /// A file that exists but cannot be parsed is an error rather than an
    /// empty registry, so a corrupt file is never silently overwritten.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let document = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| registry_io_error(&path, e))?;
            serde_json::from_str(&content).map_err(|e| {
                MonitorError::Registry(format!("{} is not a valid registry: {e}", path.display()))
            })?
        } else {
            RegistryDocument::default()
        };

        tracing::debug!(
            path = %path.display(),
            accounts = document.accounts.len(),
            "registry opened"
        );

        Ok(Self {
            path,
            document: Mutex::new(document),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of every entry, in enumeration order.
    pub fn entries(&self) -> Result<Vec<RegistryEntry>> {
        Ok(self.lock()?.accounts.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, RegistryDocument>> {
        self.document
            .lock()
            .map_err(|_| MonitorError::Registry("registry lock poisoned".to_string()))
    }

    /// Apply `change` to a copy of the document and persist it; the in-memory
    /// document is only replaced once the write succeeded.
    fn update<T>(&self, change: impl FnOnce(&mut RegistryDocument) -> T) -> Result<T> {
        let mut guard = self.lock()?;
        let mut next = guard.clone();
        let out = change(&mut next);
        self.persist(&next)?;
        *guard = next;
        Ok(out)
    }

    fn persist(&self, document: &RegistryDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| registry_io_error(parent, e))?;
        }

        let json = serde_json::to_string_pretty(document)?;

        // Write to a temp file then rename for atomicity.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &json).map_err(|e| registry_io_error(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| registry_io_error(&self.path, e))?;
        Ok(())
    }
}

impl AccountRegistry for FileRegistry {
    fn list_accounts(&self) -> Result<Vec<String>> {
        Ok(self
            .lock()?
            .accounts
            .iter()
            .map(|e| e.username.clone())
            .collect())
    }

    fn upsert_count(&self, name: &str, count: u64) -> Result<bool> {
        if self.lock()?.position(name).is_none() {
            return Ok(false);
        }
        self.update(|doc| match doc.position(name) {
            Some(idx) => {
                let entry = &mut doc.accounts[idx];
                entry.following_count = Some(count);
                entry.last_updated = Some(Utc::now());
                true
            }
            None => false,
        })
    }

    fn add_account(&self, name: &str) -> Result<bool> {
        if self.lock()?.position(name).is_some() {
            return Ok(false);
        }
        self.update(|doc| {
            if doc.position(name).is_some() {
                return false;
            }
            doc.accounts.push(RegistryEntry::new(name));
            true
        })
    }

    fn remove_account(&self, name: &str) -> Result<bool> {
        if self.lock()?.position(name).is_none() {
            return Ok(false);
        }
        self.update(|doc| match doc.position(name) {
            Some(idx) => {
                doc.accounts.remove(idx);
                true
            }
            None => false,
        })
    }

    fn following_count(&self, name: &str) -> Result<Option<u64>> {
        let doc = self.lock()?;
        Ok(doc
            .position(name)
            .and_then(|idx| doc.accounts[idx].following_count))
    }
}

fn registry_io_error(path: &Path, err: std::io::Error) -> MonitorError {
    MonitorError::Registry(format!("{}: {err}", path.display()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
