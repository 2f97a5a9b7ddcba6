use thiserror::Error;

/// All errors produced by the follow monitor.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// An authenticated session could not be established.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// A single page request failed or timed out.
    #[error("Failed to fetch {address}: {reason}")]
    Fetch { address: String, reason: String },

    /// A fetch landed on a login surface; the session is no longer valid.
    #[error("Session is not authenticated (landed on {0})")]
    NotAuthenticated(String),

    /// The page was fetched but the expected signal was absent.
    #[error("Extraction failed: {0}")]
    Extraction(String),

    /// The durable account registry could not be read or written.
    #[error("Registry error: {0}")]
    Registry(String),

    /// The session could not be re-established within its retry budget.
    #[error("Monitoring stopped: {0}")]
    Fatal(String),

    /// The WebDriver endpoint rejected a command.
    #[error("WebDriver error ({kind}): {message}")]
    WebDriver { kind: String, message: String },

    /// The Telegram Bot API rejected a request.
    #[error("Telegram error: {0}")]
    Telegram(String),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A JSON document could not be parsed.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for errors from third-party crates via `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MonitorError {
    /// Shorthand for a [`MonitorError::Fetch`] on `address`.
    pub fn fetch(address: impl Into<String>, reason: impl ToString) -> Self {
        MonitorError::Fetch {
            address: address.into(),
            reason: reason.to_string(),
        }
    }

    /// `true` when the error proves the current session is dead, as opposed to
    /// a transient scraping failure.
    pub fn is_session_lost(&self) -> bool {
        matches!(self, MonitorError::NotAuthenticated(_) | MonitorError::Auth(_))
    }
}

/// Convenience alias used throughout the monitor crates.
pub type Result<T> = std::result::Result<T, MonitorError>;
