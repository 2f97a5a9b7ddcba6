//! Persisted session cookies for the monitoring operator.
//!
//! Cookies from the last successful login are kept in one JSON file so that
//! the next browser can skip the interactive login. The cache is trusted only
//! until a page load lands on the login surface; it is then removed wholesale.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use monitor_core::error::Result;
use serde::{Deserialize, Serialize};

use crate::webdriver::Cookie;

/// On-disk shape of the credential cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// Login identifier of the operator the cookies belong to.
    pub operator: String,
    pub saved_at: DateTime<Utc>,
    pub cookies: Vec<Cookie>,
}

pub struct CredentialCache {
    path: PathBuf,
}

impl CredentialCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cached cookies for `operator`.
    ///
    /// Returns `None` when the file is absent, unreadable, written for another
    /// operator, or empty.
    pub fn load(&self, operator: &str) -> Option<Vec<Cookie>> {
        if !self.path.exists() {
            return None;
        }

        let record: CredentialRecord = match std::fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        path = %self.path.display(),
                        "failed to deserialise credential cache; ignoring it"
                    );
                    return None;
                }
            },
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    path = %self.path.display(),
                    "failed to read credential cache; ignoring it"
                );
                return None;
            }
        };

        if record.operator != operator {
            tracing::info!("credential cache belongs to another operator; ignoring it");
            return None;
        }
        if record.cookies.is_empty() {
            return None;
        }
        Some(record.cookies)
    }

    /// Atomically replace the cache with `cookies` for `operator`.
    pub fn save(&self, operator: &str, cookies: &[Cookie]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let record = CredentialRecord {
            operator: operator.to_string(),
            saved_at: Utc::now(),
            cookies: cookies.to_vec(),
        };
        let json = serde_json::to_string_pretty(&record)?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        restrict_permissions(&tmp);
        std::fs::rename(&tmp, &self.path)?;

        tracing::debug!(cookies = cookies.len(), "credential cache saved");
        Ok(())
    }

    /// Drop the cache. Errors are logged, never propagated.
    pub fn invalidate(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::info!("credential cache invalidated"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                error = %e,
                path = %self.path.display(),
                "failed to remove credential cache"
            ),
        }
    }
}

/// Restrict `path` to its owner (mode 0600).
#[cfg(unix)]
fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)) {
        tracing::warn!(error = %e, "failed to restrict credential cache permissions");
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) {}
