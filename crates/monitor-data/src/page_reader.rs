//! Signal extraction from rendered profile markup.
//!
//! The monitored surface ships obfuscated, generated class names, so both
//! readers key on literal style hooks. When the surface reshuffles its markup
//! these hooks are the first thing to break: the count reader then fails
//! loudly, while the name reader quietly yields `None`.

use monitor_core::error::{MonitorError, Result};
use scraper::{ElementRef, Html, Selector};

// ── Style hooks ───────────────────────────────────────────────────────────────

/// Container of the profile's "N Following" counter.
pub const COUNT_MARKER_CSS: &str = r#"div[class*="r-1rtiivn"]"#;

/// Spans rendering account handles on the following list.
pub const HANDLE_MARKER_CSS: &str = "span.css-1jxf684";

/// 1-based position of the newest follow among the `@` handle spans. The first
/// two matches are page chrome (the viewer and the profile owner), which also
/// render before the list itself, so a page fetched as soon as one handle span
/// shows up rarely holds this many.
pub const LATEST_FOLLOW_ORDINAL: usize = 3;

// ── Readers ───────────────────────────────────────────────────────────────────

/// Read the "following" count from a rendered profile page.
///
/// Locates the first count container, then the first `span` inside it whose
/// text holds a digit, and concatenates every digit of that text. There is no
/// locale handling: `"1,234 Following"` reads as `1234`.
pub fn extract_following_count(markup: &str) -> Result<u64> {
    let document = Html::parse_document(markup);
    let container_sel = Selector::parse(COUNT_MARKER_CSS).expect("selector is valid");
    let span_sel = Selector::parse("span").expect("selector is valid");

    let container = document.select(&container_sel).next().ok_or_else(|| {
        MonitorError::Extraction("no following-count element on page".to_string())
    })?;

    let text = container
        .select(&span_sel)
        .map(element_text)
        .find(|text| text.chars().any(|c| c.is_ascii_digit()))
        .ok_or_else(|| {
            MonitorError::Extraction("following-count element holds no digits".to_string())
        })?;

    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    digits
        .parse::<u64>()
        .map_err(|e| MonitorError::Extraction(format!("count {digits:?} is not a valid number: {e}")))
}

/// Read the handle of the most recently followed account from a rendered
/// "following" page.
///
/// Returns `None` when fewer than [`LATEST_FOLLOW_ORDINAL`] handle spans are
/// present; callers fall back to a count-only alert.
pub fn extract_latest_followed_name(markup: &str) -> Option<String> {
    let document = Html::parse_document(markup);
    let handle_sel = Selector::parse(HANDLE_MARKER_CSS).expect("selector is valid");

    let name = document
        .select(&handle_sel)
        .map(element_text)
        .filter(|text| text.starts_with('@'))
        .nth(LATEST_FOLLOW_ORDINAL - 1)?;

    let name = name.strip_prefix('@').unwrap_or(name.as_str()).trim();
    if name.is_empty() {
        tracing::debug!("latest-follow span carried an empty handle");
        return None;
    }
    Some(name.to_string())
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
