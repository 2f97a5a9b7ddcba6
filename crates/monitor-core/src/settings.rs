use clap::Parser;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{MonitorError, Result};

// ── Secret ─────────────────────────────────────────────────────────────────────

/// A string that never shows up in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw secret value. Keep call sites to the places that transmit it.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

// ── OperatorCredentials ────────────────────────────────────────────────────────

/// Login identity of the monitoring operator on the target surface.
#[derive(Debug, Clone)]
pub struct OperatorCredentials {
    /// Identifier typed into the first login field (usually an email).
    pub identifier: String,
    /// Handle typed into the "confirm identifier" interstitial.
    pub username: String,
    pub password: Secret,
}

// ── Settings (CLI + env) ───────────────────────────────────────────────────────

/// Watch social accounts for follow/unfollow activity
#[derive(Parser, Debug, Clone)]
#[command(
    name = "follow-monitor",
    about = "Watch social accounts for follow/unfollow activity",
    version
)]
pub struct Settings {
    /// Run mode: Telegram command bot, or headless loop logging alerts
    #[arg(long, default_value = "bot", value_parser = ["bot", "headless"])]
    pub mode: String,

    /// Telegram bot token
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    pub telegram_token: Option<Secret>,

    /// Telegram usernames allowed to issue commands (comma separated)
    #[arg(long, env = "AUTHORIZED_USERS", value_delimiter = ',')]
    pub authorized_users: Vec<String>,

    /// Login identifier (email) of the operator account
    #[arg(long, env = "TWITTER_EMAIL")]
    pub twitter_email: Option<String>,

    /// Operator handle, asked for by the identifier confirmation step
    #[arg(long, env = "TWITTER_USERNAME")]
    pub twitter_username: Option<String>,

    /// Operator password
    #[arg(long, env = "TWITTER_PASSWORD", hide_env_values = true)]
    pub twitter_password: Option<Secret>,

    /// Seconds to wait between two account checks
    #[arg(long, env = "CHECK_INTERVAL", default_value = "10", value_parser = clap::value_parser!(u64).range(1..))]
    pub check_interval: u64,

    /// Consecutive failures tolerated before the browser session is rebuilt
    #[arg(long, env = "FAILURE_CEILING", default_value = "5", value_parser = clap::value_parser!(u32).range(1..))]
    pub failure_ceiling: u32,

    /// Session rebuild attempts before monitoring stops
    #[arg(long, env = "REBUILD_ATTEMPTS", default_value = "3", value_parser = clap::value_parser!(u32).range(1..))]
    pub rebuild_attempts: u32,

    /// Base back-off in seconds between rebuild attempts
    #[arg(long, env = "REBUILD_BACKOFF", default_value = "10")]
    pub rebuild_backoff: u64,

    /// WebDriver endpoint (chromedriver, geckodriver, selenium grid)
    #[arg(long, env = "WEBDRIVER_URL", default_value = "http://localhost:9515")]
    pub webdriver_url: String,

    /// Base URL of the monitored surface
    #[arg(long, env = "TARGET_BASE_URL", default_value = "https://twitter.com")]
    pub target_base_url: String,

    /// Seconds to wait for a page element before giving up
    #[arg(long, env = "PAGE_TIMEOUT", default_value = "10", value_parser = clap::value_parser!(u64).range(1..))]
    pub page_timeout: u64,

    /// Run the browser with a visible window
    #[arg(long)]
    pub show_browser: bool,

    /// Directory holding the registry and credential cache
    #[arg(long, env = "FOLLOW_MONITOR_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])]
    pub log_level: String,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

impl Settings {
    /// Parse the process arguments (and environment) and resolve derived values.
    pub fn load() -> Self {
        Self::resolve(Self::parse())
    }

    /// Same as [`Settings::load`] with an explicit argument list.
    pub fn load_from<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Self::resolve(Self::parse_from(args))
    }

    /// Apply the `--debug` flag and normalise list values.
    fn resolve(mut settings: Settings) -> Settings {
        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }
        settings.authorized_users = settings
            .authorized_users
            .iter()
            .map(|u| u.trim().trim_start_matches('@').to_string())
            .filter(|u| !u.is_empty())
            .collect();
        settings
    }

    /// Reject configurations that cannot possibly run.
    pub fn validate(&self) -> Result<()> {
        self.operator_credentials()?;

        if self.mode == "bot" {
            if self.telegram_token.as_ref().map_or(true, Secret::is_empty) {
                return Err(MonitorError::Config(
                    "TELEGRAM_BOT_TOKEN is required in bot mode".to_string(),
                ));
            }
            if self.authorized_users.is_empty() {
                return Err(MonitorError::Config(
                    "No authorized users specified in AUTHORIZED_USERS".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Operator login identity; the username falls back to the local part of
    /// the email when not configured.
    pub fn operator_credentials(&self) -> Result<OperatorCredentials> {
        let identifier = self
            .twitter_email
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| MonitorError::Config("TWITTER_EMAIL is required".to_string()))?;
        let password = self
            .twitter_password
            .clone()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| MonitorError::Config("TWITTER_PASSWORD is required".to_string()))?;

        let username = match self.twitter_username.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.trim_start_matches('@').to_string(),
            _ => identifier
                .split('@')
                .next()
                .unwrap_or(identifier)
                .to_string(),
        };

        Ok(OperatorCredentials {
            identifier: identifier.to_string(),
            username,
            password,
        })
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval)
    }

    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout)
    }

    pub fn rebuild_backoff(&self) -> Duration {
        Duration::from_secs(self.rebuild_backoff)
    }

    /// Resolved data directory, `~/.follow-monitor` by default.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".follow-monitor")
        })
    }

    pub fn registry_path(&self) -> PathBuf {
        self.data_dir().join("registry.json")
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.data_dir().join("credentials.json")
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
