//! Minimal W3C WebDriver client.
//!
//! Speaks the JSON wire protocol of chromedriver/geckodriver/Selenium directly
//! over HTTP, covering only the commands the browser session needs: session
//! lifecycle, navigation, page source, element lookup, typing and cookies.

use std::time::Duration;

use monitor_core::error::{MonitorError, Result};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Key under which the protocol returns element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// The Enter key in WebDriver's private-use key table.
pub const ENTER_KEY: char = '\u{E007}';

// ── Cookie ────────────────────────────────────────────────────────────────────

/// A browser cookie as serialized by the WebDriver protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

// ── Capabilities ──────────────────────────────────────────────────────────────

/// Chrome capabilities for a monitoring browser.
pub fn chrome_capabilities(headless: bool) -> Value {
    let mut args = vec![
        "--window-size=1920,1080",
        "--disable-gpu",
        "--no-sandbox",
        "--disable-dev-shm-usage",
    ];
    if headless {
        args.push("--headless=new");
    }
    json!({
        "browserName": "chrome",
        "goog:chromeOptions": { "args": args },
    })
}

// ── WebDriverClient ───────────────────────────────────────────────────────────

pub struct WebDriverClient {
    http: reqwest::Client,
    base_url: String,
}

impl WebDriverClient {
    /// Create a client for the WebDriver endpoint at `base_url`.
    ///
    /// `request_timeout` bounds every single protocol command, including page
    /// loads triggered by navigation.
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| MonitorError::Config(format!("failed to build WebDriver client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Start a browser session and return its id.
    pub async fn new_session(&self, capabilities: Value) -> Result<String> {
        let body = json!({ "capabilities": { "alwaysMatch": capabilities } });
        let value = self.command(Method::POST, "/session", Some(body)).await?;
        value["sessionId"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| protocol_error("new session response carried no sessionId"))
    }

    pub async fn delete_session(&self, session: &str) -> Result<()> {
        self.command(Method::DELETE, &format!("/session/{session}"), None)
            .await
            .map(|_| ())
    }

    /// Load `url` and wait for the document to finish loading.
    pub async fn navigate(&self, session: &str, url: &str) -> Result<()> {
        self.command(
            Method::POST,
            &format!("/session/{session}/url"),
            Some(json!({ "url": url })),
        )
        .await
        .map(|_| ())
    }

    pub async fn current_url(&self, session: &str) -> Result<String> {
        let value = self
            .command(Method::GET, &format!("/session/{session}/url"), None)
            .await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| protocol_error("current url is not a string"))
    }

    pub async fn page_source(&self, session: &str) -> Result<String> {
        let value = self
            .command(Method::GET, &format!("/session/{session}/source"), None)
            .await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| protocol_error("page source is not a string"))
    }

    /// Look up the first element matching `css`. `Ok(None)` when nothing
    /// matches yet.
    pub async fn find_element(&self, session: &str, css: &str) -> Result<Option<String>> {
        let body = json!({ "using": "css selector", "value": css });
        match self
            .command(Method::POST, &format!("/session/{session}/element"), Some(body))
            .await
        {
            Ok(value) => value[ELEMENT_KEY]
                .as_str()
                .map(|id| Some(id.to_string()))
                .ok_or_else(|| protocol_error("element response carried no reference")),
            Err(MonitorError::WebDriver { kind, .. }) if kind == "no such element" => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// References of every element currently matching `css`, in document
    /// order. Empty when nothing matches yet.
    pub async fn find_elements(&self, session: &str, css: &str) -> Result<Vec<String>> {
        let body = json!({ "using": "css selector", "value": css });
        let value = self
            .command(Method::POST, &format!("/session/{session}/elements"), Some(body))
            .await?;
        let elements = value
            .as_array()
            .ok_or_else(|| protocol_error("elements response is not an array"))?;
        elements
            .iter()
            .map(|element| {
                element[ELEMENT_KEY]
                    .as_str()
                    .map(str::to_string)
                    .ok_or_else(|| protocol_error("element response carried no reference"))
            })
            .collect()
    }

    /// Type `text` into `element`.
    pub async fn send_keys(&self, session: &str, element: &str, text: &str) -> Result<()> {
        self.command(
            Method::POST,
            &format!("/session/{session}/element/{element}/value"),
            Some(json!({ "text": text })),
        )
        .await
        .map(|_| ())
    }

    pub async fn cookies(&self, session: &str) -> Result<Vec<Cookie>> {
        let value = self
            .command(Method::GET, &format!("/session/{session}/cookie"), None)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Install `cookie` for the document currently loaded in the session.
    pub async fn add_cookie(&self, session: &str, cookie: &Cookie) -> Result<()> {
        self.command(
            Method::POST,
            &format!("/session/{session}/cookie"),
            Some(json!({ "cookie": cookie })),
        )
        .await
        .map(|_| ())
    }

    /// Issue one protocol command and unwrap the `value` envelope.
    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.http.request(method.clone(), &url);
        // POST commands must carry a JSON body, even an empty one.
        if method == Method::POST {
            request = request.json(&body.unwrap_or_else(|| json!({})));
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let payload: Value = response.json().await.map_err(transport_error)?;
        let value = payload.get("value").cloned().unwrap_or(Value::Null);

        if !status.is_success() {
            let kind = value["error"].as_str().unwrap_or("unknown error").to_string();
            let message = value["message"]
                .as_str()
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed"))
                .to_string();
            tracing::trace!(%method, path, %kind, "webdriver command failed");
            return Err(MonitorError::WebDriver { kind, message });
        }

        Ok(value)
    }
}

fn transport_error(err: reqwest::Error) -> MonitorError {
    let kind = if err.is_timeout() { "timeout" } else { "transport" };
    MonitorError::WebDriver {
        kind: kind.to_string(),
        message: err.to_string(),
    }
}

fn protocol_error(message: &str) -> MonitorError {
    MonitorError::WebDriver {
        kind: "protocol".to_string(),
        message: message.to_string(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
