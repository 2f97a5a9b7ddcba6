//! Authenticated browser session against the monitored surface.
//!
//! [`SessionResource`] is the capability the monitoring loop depends on:
//! acquire an authenticated session, fetch rendered pages through it, release
//! it. [`BrowserSession`] implements it on top of a WebDriver-driven browser,
//! reusing cached cookies when possible and falling back to an interactive
//! login otherwise.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use monitor_core::error::{MonitorError, Result};
use monitor_core::models::MonitoredAccount;
use monitor_core::settings::{OperatorCredentials, Settings};
use monitor_data::page_reader::{COUNT_MARKER_CSS, HANDLE_MARKER_CSS, LATEST_FOLLOW_ORDINAL};
use regex::Regex;
use tokio::time::Instant;

use crate::credentials::CredentialCache;
use crate::webdriver::{chrome_capabilities, WebDriverClient, ENTER_KEY};

const IDENTIFIER_FIELD_CSS: &str = r#"input[name="text"]"#;
const PASSWORD_FIELD_CSS: &str = r#"input[name="password"]"#;

// ── PageAddress ───────────────────────────────────────────────────────────────

/// Logical address of a page on the monitored surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageAddress {
    /// The account's profile, which carries its following count.
    Profile(MonitoredAccount),
    /// The account's following list, newest first.
    Following(MonitoredAccount),
}

impl PageAddress {
    pub fn account(&self) -> &MonitoredAccount {
        match self {
            PageAddress::Profile(account) | PageAddress::Following(account) => account,
        }
    }

    /// Absolute URL of this page under `base_url`.
    pub fn url(&self, base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');
        match self {
            PageAddress::Profile(account) => format!("{base}/{}", account.name()),
            PageAddress::Following(account) => format!("{base}/{}/following", account.name()),
        }
    }

    /// Element whose presence means the page finished rendering its data.
    pub fn content_marker(&self) -> &'static str {
        match self {
            PageAddress::Profile(_) => COUNT_MARKER_CSS,
            PageAddress::Following(_) => HANDLE_MARKER_CSS,
        }
    }

    /// How many content markers to wait for. Page chrome on the following
    /// list renders handle spans of its own before the list arrives.
    pub fn content_threshold(&self) -> usize {
        match self {
            PageAddress::Profile(_) => 1,
            PageAddress::Following(_) => LATEST_FOLLOW_ORDINAL,
        }
    }
}

impl fmt::Display for PageAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageAddress::Profile(account) => write!(f, "profile of {account}"),
            PageAddress::Following(account) => write!(f, "following list of {account}"),
        }
    }
}

// ── SessionHandle ─────────────────────────────────────────────────────────────

/// Opaque handle to one authenticated connection.
///
/// Not `Clone`: [`SessionResource::release`] consumes the handle, so a
/// retired session cannot be used afterwards.
#[derive(Debug, PartialEq, Eq)]
pub struct SessionHandle {
    id: String,
    generation: u64,
}

impl SessionHandle {
    pub fn new(id: impl Into<String>, generation: u64) -> Self {
        Self {
            id: id.into(),
            generation,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Monotonic counter of sessions acquired from the same resource.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

// ── SessionResource ───────────────────────────────────────────────────────────

#[async_trait]
pub trait SessionResource: Send + Sync {
    /// Establish a new authenticated session. Fails with
    /// [`MonitorError::Auth`] when no session can be established.
    async fn acquire(&self) -> Result<SessionHandle>;

    /// Return the fully rendered markup at `address`.
    async fn fetch(&self, handle: &SessionHandle, address: &PageAddress) -> Result<String>;

    /// Tear the session down. Best effort; never fails.
    async fn release(&self, handle: SessionHandle);
}

/// `true` when `url` points at the surface's login flow.
pub fn is_login_url(url: &str) -> bool {
    let re = Regex::new(r"/(?:i/flow/)?login(?:[/?#]|$)").expect("regex is valid");
    re.is_match(url)
}

// ── BrowserConfig ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub webdriver_url: String,
    pub base_url: String,
    pub headless: bool,
    /// Upper bound for any element to appear.
    pub page_timeout: Duration,
    /// Delay between two element lookups while waiting.
    pub poll_interval: Duration,
    /// Pause after submitting the password or restoring cookies, before the
    /// landing URL is inspected.
    pub login_settle: Duration,
    pub credentials: OperatorCredentials,
    pub credential_cache_path: PathBuf,
}

impl BrowserConfig {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self {
            webdriver_url: settings.webdriver_url.clone(),
            base_url: settings.target_base_url.trim_end_matches('/').to_string(),
            headless: !settings.show_browser,
            page_timeout: settings.page_timeout(),
            poll_interval: Duration::from_millis(250),
            login_settle: Duration::from_secs(5),
            credentials: settings.operator_credentials()?,
            credential_cache_path: settings.credentials_path(),
        })
    }
}

// ── BrowserSession ────────────────────────────────────────────────────────────

/// [`SessionResource`] backed by a WebDriver-controlled browser.
pub struct BrowserSession {
    driver: WebDriverClient,
    cache: CredentialCache,
    config: BrowserConfig,
    generation: AtomicU64,
}

impl BrowserSession {
    pub fn new(config: BrowserConfig) -> Result<Self> {
        // Navigation blocks until the page loads; leave headroom above the
        // element timeout for slow loads.
        let request_timeout = config.page_timeout * 3;
        let driver = WebDriverClient::new(&config.webdriver_url, request_timeout)?;
        let cache = CredentialCache::new(config.credential_cache_path.clone());
        Ok(Self {
            driver,
            cache,
            config,
            generation: AtomicU64::new(0),
        })
    }

    async fn login(&self, session: &str) -> Result<()> {
        if self.restore_cached(session).await? {
            tracing::info!("reusing cached session cookies");
            return Ok(());
        }
        self.interactive_login(session).await
    }

    /// Install cached cookies and check whether they still authenticate.
    async fn restore_cached(&self, session: &str) -> Result<bool> {
        let Some(cookies) = self.cache.load(&self.config.credentials.identifier) else {
            return Ok(false);
        };

        // Cookies can only be set for the document's own domain.
        self.driver.navigate(session, &self.config.base_url).await?;
        for cookie in &cookies {
            if let Err(e) = self.driver.add_cookie(session, cookie).await {
                tracing::debug!(cookie = %cookie.name, error = %e, "cached cookie rejected");
            }
        }

        let home = format!("{}/home", self.config.base_url);
        self.driver.navigate(session, &home).await?;
        tokio::time::sleep(self.config.login_settle).await;

        let landed = self.driver.current_url(session).await?;
        if is_login_url(&landed) {
            tracing::info!(url = %landed, "cached session expired");
            self.cache.invalidate();
            return Ok(false);
        }
        Ok(true)
    }

    async fn interactive_login(&self, session: &str) -> Result<()> {
        let creds = &self.config.credentials;
        tracing::info!("logging in interactively");

        let login_url = format!("{}/login", self.config.base_url);
        self.driver.navigate(session, &login_url).await?;

        let identifier = self
            .wait_for(session, IDENTIFIER_FIELD_CSS)
            .await?
            .ok_or_else(|| MonitorError::Auth("login form never appeared".to_string()))?;
        self.submit(session, &identifier, &creds.identifier).await?;

        // The surface sometimes interposes a "confirm your username" step
        // which reuses the identifier field's name on a fresh element.
        match self
            .wait_for_any(session, &[PASSWORD_FIELD_CSS, IDENTIFIER_FIELD_CSS], Some(&identifier))
            .await?
        {
            Some((0, _)) => {}
            Some((_, confirm)) => {
                tracing::debug!("answering identifier confirmation step");
                self.submit(session, &confirm, &creds.username).await?;
            }
            None => {
                return Err(MonitorError::Auth(
                    "password field never appeared after submitting the identifier".to_string(),
                ))
            }
        }

        let password = self
            .wait_for(session, PASSWORD_FIELD_CSS)
            .await?
            .ok_or_else(|| MonitorError::Auth("password field never appeared".to_string()))?;
        self.submit(session, &password, creds.password.expose()).await?;

        tokio::time::sleep(self.config.login_settle).await;

        let landed = self.driver.current_url(session).await?;
        if is_login_url(&landed) {
            return Err(MonitorError::Auth(
                "still on the login page after submitting credentials; check them".to_string(),
            ));
        }

        match self.driver.cookies(session).await {
            Ok(cookies) => {
                if let Err(e) = self.cache.save(&creds.identifier, &cookies) {
                    tracing::warn!(error = %e, "failed to persist session cookies");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to read session cookies"),
        }

        tracing::info!("logged in");
        Ok(())
    }

    async fn submit(&self, session: &str, element: &str, text: &str) -> Result<()> {
        let mut keys = String::with_capacity(text.len() + 1);
        keys.push_str(text);
        keys.push(ENTER_KEY);
        self.driver.send_keys(session, element, &keys).await
    }

    async fn wait_for(&self, session: &str, css: &str) -> Result<Option<String>> {
        Ok(self
            .wait_for_any(session, &[css], None)
            .await?
            .map(|(_, element)| element))
    }

    /// Poll until at least `min` elements match `css`.
    ///
    /// Returns the last observed match count, which is below `min` when the
    /// page timeout elapsed first.
    async fn wait_for_count(&self, session: &str, css: &str, min: usize) -> Result<usize> {
        let deadline = Instant::now() + self.config.page_timeout;
        loop {
            let found = self.driver.find_elements(session, css).await?.len();
            if found >= min || Instant::now() >= deadline {
                return Ok(found);
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Poll until one of `selectors` matches an element other than `skip`.
    ///
    /// Returns the index of the matching selector and the element reference,
    /// or `None` once the page timeout elapses.
    async fn wait_for_any(
        &self,
        session: &str,
        selectors: &[&str],
        skip: Option<&str>,
    ) -> Result<Option<(usize, String)>> {
        let deadline = Instant::now() + self.config.page_timeout;
        loop {
            for (idx, css) in selectors.iter().enumerate() {
                if let Some(element) = self.driver.find_element(session, css).await? {
                    if skip != Some(element.as_str()) {
                        return Ok(Some((idx, element)));
                    }
                }
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    async fn close(&self, session: &str) {
        if let Err(e) = self.driver.delete_session(session).await {
            tracing::debug!(session, error = %e, "browser teardown failed; ignoring");
        }
    }
}

#[async_trait]
impl SessionResource for BrowserSession {
    async fn acquire(&self) -> Result<SessionHandle> {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let id = self
            .driver
            .new_session(chrome_capabilities(self.config.headless))
            .await
            .map_err(|e| MonitorError::Auth(format!("could not start browser: {e}")))?;
        tracing::debug!(session = %id, generation, "browser started");

        match self.login(&id).await {
            Ok(()) => Ok(SessionHandle::new(id, generation)),
            Err(e) => {
                self.close(&id).await;
                Err(match e {
                    MonitorError::Auth(_) => e,
                    other => MonitorError::Auth(format!("login failed: {other}")),
                })
            }
        }
    }

    async fn fetch(&self, handle: &SessionHandle, address: &PageAddress) -> Result<String> {
        let session = handle.id();
        let url = address.url(&self.config.base_url);
        tracing::debug!(%address, "navigating");

        self.driver
            .navigate(session, &url)
            .await
            .map_err(|e| MonitorError::fetch(&url, e))?;

        let landed = self
            .driver
            .current_url(session)
            .await
            .map_err(|e| MonitorError::fetch(&url, e))?;
        if is_login_url(&landed) {
            self.cache.invalidate();
            return Err(MonitorError::NotAuthenticated(landed));
        }

        let threshold = address.content_threshold();
        let rendered = if threshold <= 1 {
            self.wait_for(session, address.content_marker())
                .await
                .map(|found| usize::from(found.is_some()))
        } else {
            self.wait_for_count(session, address.content_marker(), threshold)
                .await
        };

        match rendered {
            Ok(0) => {
                return Err(MonitorError::fetch(
                    &url,
                    format!(
                        "content did not render within {}s",
                        self.config.page_timeout.as_secs_f32()
                    ),
                ))
            }
            Ok(found) if found < threshold => {
                tracing::debug!(%address, found, threshold, "page rendered fewer markers than expected");
            }
            Ok(_) => {}
            Err(e) => return Err(MonitorError::fetch(&url, e)),
        }

        self.driver
            .page_source(session)
            .await
            .map_err(|e| MonitorError::fetch(&url, e))
    }

    async fn release(&self, handle: SessionHandle) {
        tracing::debug!(session = %handle.id(), generation = handle.generation(), "releasing browser");
        self.close(handle.id()).await;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webdriver::Cookie;
    use monitor_core::settings::Secret;
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{body_partial_json, method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";
    const BASE: &str = "https://twitter.com";

    fn config(server: &MockServer, dir: &TempDir) -> BrowserConfig {
        BrowserConfig {
            webdriver_url: server.uri(),
            base_url: BASE.to_string(),
            headless: true,
            page_timeout: Duration::from_millis(200),
            poll_interval: Duration::from_millis(10),
            login_settle: Duration::ZERO,
            credentials: OperatorCredentials {
                identifier: "op@example.com".to_string(),
                username: "op".to_string(),
                password: Secret::new("hunter2"),
            },
            credential_cache_path: dir.path().join("credentials.json"),
        }
    }

    fn ok(value: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({ "value": value }))
    }

    fn no_such_element() -> ResponseTemplate {
        ResponseTemplate::new(404).set_body_json(json!({
            "value": { "error": "no such element", "message": "Unable to locate element" }
        }))
    }

    async fn mount_new_session(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/session"))
            .respond_with(ok(json!({ "sessionId": "s1", "capabilities": {} })))
            .mount(server)
            .await;
    }

    async fn mount_element(server: &MockServer, css: &str, response: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path("/session/s1/element"))
            .and(body_partial_json(json!({ "value": css })))
            .respond_with(response)
            .mount(server)
            .await;
    }

    async fn mount_current_url(server: &MockServer, url: &str) {
        Mock::given(method("GET"))
            .and(path("/session/s1/url"))
            .respond_with(ok(json!(url)))
            .mount(server)
            .await;
    }

    async fn mount_passthrough(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/session/s1/url"))
            .respond_with(ok(serde_json::Value::Null))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path_regex(r"^/session/s1/element/[^/]+/value$"))
            .respond_with(ok(serde_json::Value::Null))
            .mount(server)
            .await;
    }

    fn auth_cookie() -> Cookie {
        serde_json::from_value(json!({ "name": "auth_token", "value": "abc" })).unwrap()
    }

    fn account(name: &str) -> MonitoredAccount {
        MonitoredAccount::new(name)
    }

    // ── pure helpers ──────────────────────────────────────────────────────

    #[test]
    fn test_page_address_urls() {
        let profile = PageAddress::Profile(account("alice"));
        let following = PageAddress::Following(account("alice"));
        assert_eq!(profile.url("https://twitter.com/"), "https://twitter.com/alice");
        assert_eq!(following.url(BASE), "https://twitter.com/alice/following");
        assert_eq!(profile.content_marker(), COUNT_MARKER_CSS);
        assert_eq!(following.content_marker(), HANDLE_MARKER_CSS);
        assert_eq!(profile.content_threshold(), 1);
        assert_eq!(following.content_threshold(), LATEST_FOLLOW_ORDINAL);
        assert_eq!(following.to_string(), "following list of @alice");
    }

    #[test]
    fn test_is_login_url() {
        assert!(is_login_url("https://twitter.com/login"));
        assert!(is_login_url("https://twitter.com/i/flow/login"));
        assert!(is_login_url("https://x.com/i/flow/login?redirect_after_login=%2Falice"));
        assert!(!is_login_url("https://twitter.com/home"));
        assert!(!is_login_url("https://twitter.com/loginmaster"));
        assert!(!is_login_url("https://twitter.com/alice/following"));
    }

    // ── acquire ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_interactive_login_persists_cookies() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        mount_new_session(&server).await;
        mount_passthrough(&server).await;
        mount_element(&server, IDENTIFIER_FIELD_CSS, ok(json!({ ELEMENT_KEY: "ident" }))).await;
        mount_element(&server, PASSWORD_FIELD_CSS, ok(json!({ ELEMENT_KEY: "pw" }))).await;
        mount_current_url(&server, "https://twitter.com/home").await;
        Mock::given(method("GET"))
            .and(path("/session/s1/cookie"))
            .respond_with(ok(json!([{ "name": "auth_token", "value": "abc" }])))
            .mount(&server)
            .await;

        let session = BrowserSession::new(config(&server, &dir)).unwrap();
        let handle = session.acquire().await.unwrap();
        assert_eq!(handle.id(), "s1");
        assert_eq!(handle.generation(), 1);

        let cached = session.cache.load("op@example.com").unwrap();
        assert_eq!(cached[0].name, "auth_token");
    }

    #[tokio::test]
    async fn test_interactive_login_answers_confirmation_step() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        mount_new_session(&server).await;
        Mock::given(method("POST"))
            .and(path("/session/s1/url"))
            .respond_with(ok(serde_json::Value::Null))
            .mount(&server)
            .await;
        // First lookup of the identifier field yields the original input,
        // later lookups yield the confirmation input.
        Mock::given(method("POST"))
            .and(path("/session/s1/element"))
            .and(body_partial_json(json!({ "value": IDENTIFIER_FIELD_CSS })))
            .respond_with(ok(json!({ ELEMENT_KEY: "ident" })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        mount_element(&server, IDENTIFIER_FIELD_CSS, ok(json!({ ELEMENT_KEY: "confirm" }))).await;
        // The password field only shows up after the confirmation step; the
        // first lookup (racing the confirmation) misses it.
        Mock::given(method("POST"))
            .and(path("/session/s1/element"))
            .and(body_partial_json(json!({ "value": PASSWORD_FIELD_CSS })))
            .respond_with(no_such_element())
            .up_to_n_times(1)
            .mount(&server)
            .await;
        mount_element(&server, PASSWORD_FIELD_CSS, ok(json!({ ELEMENT_KEY: "pw" }))).await;
        Mock::given(method("POST"))
            .and(path("/session/s1/element/ident/value"))
            .and(body_partial_json(json!({ "text": "op@example.com\u{E007}" })))
            .respond_with(ok(serde_json::Value::Null))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/session/s1/element/confirm/value"))
            .and(body_partial_json(json!({ "text": "op\u{E007}" })))
            .respond_with(ok(serde_json::Value::Null))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/session/s1/element/pw/value"))
            .and(body_partial_json(json!({ "text": "hunter2\u{E007}" })))
            .respond_with(ok(serde_json::Value::Null))
            .expect(1)
            .mount(&server)
            .await;
        mount_current_url(&server, "https://twitter.com/home").await;
        Mock::given(method("GET"))
            .and(path("/session/s1/cookie"))
            .respond_with(ok(json!([])))
            .mount(&server)
            .await;

        let session = BrowserSession::new(config(&server, &dir)).unwrap();
        session.acquire().await.unwrap();
    }

    #[tokio::test]
    async fn test_login_rejected_is_auth_error_and_closes_browser() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        mount_new_session(&server).await;
        mount_passthrough(&server).await;
        mount_element(&server, IDENTIFIER_FIELD_CSS, ok(json!({ ELEMENT_KEY: "ident" }))).await;
        mount_element(&server, PASSWORD_FIELD_CSS, ok(json!({ ELEMENT_KEY: "pw" }))).await;
        mount_current_url(&server, "https://twitter.com/i/flow/login").await;
        Mock::given(method("DELETE"))
            .and(path("/session/s1"))
            .respond_with(ok(serde_json::Value::Null))
            .expect(1)
            .mount(&server)
            .await;

        let session = BrowserSession::new(config(&server, &dir)).unwrap();
        let err = session.acquire().await.unwrap_err();
        assert!(matches!(err, MonitorError::Auth(_)), "got {err:?}");
        assert!(!dir.path().join("credentials.json").exists());
    }

    #[tokio::test]
    async fn test_missing_login_form_is_auth_error() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        mount_new_session(&server).await;
        mount_passthrough(&server).await;
        mount_element(&server, IDENTIFIER_FIELD_CSS, no_such_element()).await;
        Mock::given(method("DELETE"))
            .and(path("/session/s1"))
            .respond_with(ok(serde_json::Value::Null))
            .mount(&server)
            .await;

        let session = BrowserSession::new(config(&server, &dir)).unwrap();
        let err = session.acquire().await.unwrap_err();
        assert!(err.to_string().contains("login form never appeared"));
    }

    #[tokio::test]
    async fn test_cached_cookies_skip_interactive_login() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let cfg = config(&server, &dir);
        CredentialCache::new(cfg.credential_cache_path.clone())
            .save(
                "op@example.com",
                &[auth_cookie()],
            )
            .unwrap();

        mount_new_session(&server).await;
        Mock::given(method("POST"))
            .and(path("/session/s1/url"))
            .respond_with(ok(serde_json::Value::Null))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/session/s1/cookie"))
            .respond_with(ok(serde_json::Value::Null))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/session/s1/element"))
            .respond_with(no_such_element())
            .expect(0)
            .mount(&server)
            .await;
        mount_current_url(&server, "https://twitter.com/home").await;

        let session = BrowserSession::new(cfg).unwrap();
        session.acquire().await.unwrap();
    }

    // ── fetch ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_fetch_returns_page_source() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        mount_passthrough(&server).await;
        mount_current_url(&server, "https://twitter.com/alice").await;
        mount_element(&server, COUNT_MARKER_CSS, ok(json!({ ELEMENT_KEY: "count" }))).await;
        Mock::given(method("GET"))
            .and(path("/session/s1/source"))
            .respond_with(ok(json!("<html>profile</html>")))
            .mount(&server)
            .await;

        let session = BrowserSession::new(config(&server, &dir)).unwrap();
        let handle = SessionHandle::new("s1", 1);
        let markup = session
            .fetch(&handle, &PageAddress::Profile(account("alice")))
            .await
            .unwrap();
        assert_eq!(markup, "<html>profile</html>");
    }

    #[tokio::test]
    async fn test_following_fetch_waits_past_page_chrome() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        mount_passthrough(&server).await;
        mount_current_url(&server, "https://twitter.com/alice/following").await;
        // Only the viewer's own handle at first; the list arrives later.
        Mock::given(method("POST"))
            .and(path("/session/s1/elements"))
            .and(body_partial_json(json!({ "value": HANDLE_MARKER_CSS })))
            .respond_with(ok(json!([{ ELEMENT_KEY: "viewer" }])))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/session/s1/elements"))
            .and(body_partial_json(json!({ "value": HANDLE_MARKER_CSS })))
            .respond_with(ok(json!([
                { ELEMENT_KEY: "viewer" },
                { ELEMENT_KEY: "owner" },
                { ELEMENT_KEY: "newest" }
            ])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/session/s1/source"))
            .respond_with(ok(json!("<html>following</html>")))
            .expect(1)
            .mount(&server)
            .await;

        let session = BrowserSession::new(config(&server, &dir)).unwrap();
        let markup = session
            .fetch(&SessionHandle::new("s1", 1), &PageAddress::Following(account("alice")))
            .await
            .unwrap();
        assert_eq!(markup, "<html>following</html>");
    }

    #[tokio::test]
    async fn test_short_following_list_still_returns_source() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        mount_passthrough(&server).await;
        mount_current_url(&server, "https://twitter.com/alice/following").await;
        Mock::given(method("POST"))
            .and(path("/session/s1/elements"))
            .respond_with(ok(json!([{ ELEMENT_KEY: "viewer" }])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/session/s1/source"))
            .respond_with(ok(json!("<html>short</html>")))
            .mount(&server)
            .await;

        let session = BrowserSession::new(config(&server, &dir)).unwrap();
        let markup = session
            .fetch(&SessionHandle::new("s1", 1), &PageAddress::Following(account("alice")))
            .await
            .unwrap();
        assert_eq!(markup, "<html>short</html>");
    }

    #[tokio::test]
    async fn test_fetch_times_out_without_content_marker() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        mount_passthrough(&server).await;
        mount_current_url(&server, "https://twitter.com/alice").await;
        mount_element(&server, COUNT_MARKER_CSS, no_such_element()).await;
        Mock::given(method("GET"))
            .and(path("/session/s1/source"))
            .respond_with(ok(json!("<html>partial</html>")))
            .expect(0)
            .mount(&server)
            .await;

        let session = BrowserSession::new(config(&server, &dir)).unwrap();
        let err = session
            .fetch(&SessionHandle::new("s1", 1), &PageAddress::Profile(account("alice")))
            .await
            .unwrap_err();
        assert!(matches!(err, MonitorError::Fetch { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn test_fetch_on_login_surface_invalidates_cache() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let cfg = config(&server, &dir);
        let cache = CredentialCache::new(cfg.credential_cache_path.clone());
        cache
            .save(
                "op@example.com",
                &[auth_cookie()],
            )
            .unwrap();
        mount_passthrough(&server).await;
        mount_current_url(&server, "https://twitter.com/i/flow/login").await;

        let session = BrowserSession::new(cfg).unwrap();
        let err = session
            .fetch(&SessionHandle::new("s1", 1), &PageAddress::Profile(account("alice")))
            .await
            .unwrap_err();
        assert!(matches!(err, MonitorError::NotAuthenticated(_)), "got {err:?}");
        assert!(!cache.path().exists());
    }

    #[tokio::test]
    async fn test_release_swallows_teardown_errors() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        Mock::given(method("DELETE"))
            .and(path("/session/s1"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "value": { "error": "unknown error", "message": "chrome not reachable" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session = BrowserSession::new(config(&server, &dir)).unwrap();
        session.release(SessionHandle::new("s1", 1)).await;
    }
}
