//! In-browser fallback for a rate-limited direct call.
//!
//! Re-issues the request from inside the still-open bootstrap tab so it
//! rides the browser's own network identity (cookies, TLS fingerprint,
//! proxy). Used for exactly one escalation tier; the fallback itself is not
//! retried.

use crate::browser::BrowserError;
use crate::error::{FetchStage, ScrapeError};
use headless_chrome::Tab;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
struct InPageResponse {
    status: u16,
    body: String,
}

/// Execute a same-origin GET from the page's execution context and return
/// the parsed JSON body.
pub fn fetch_via_browser(tab: &Arc<Tab>, url: &str) -> Result<serde_json::Value, ScrapeError> {
    log::info!("Browser fallback fetch {}", url);

    // serde_json renders the URL as a quoted, escaped JS string literal
    let url_literal = serde_json::to_string(url)?;
    let script = format!(
        r#"(async () => {{
            const res = await fetch({}, {{
                credentials: 'include',
                headers: {{ 'accept': 'application/json' }}
            }});
            const body = await res.text();
            return JSON.stringify({{ status: res.status, body: body }});
        }})()"#,
        url_literal
    );

    let result = tab
        .evaluate(&script, true)
        .map_err(|e| BrowserError::JavaScriptError(e.to_string()))?;

    let raw = result
        .value
        .as_ref()
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            ScrapeError::from(BrowserError::JavaScriptError(
                "in-page fetch returned no value".to_string(),
            ))
        })?;

    let envelope: InPageResponse = serde_json::from_str(raw)?;

    if !(200..300).contains(&envelope.status) {
        return Err(ScrapeError::UpstreamFailed {
            stage: FetchStage::Fallback,
            status: envelope.status,
        });
    }

    serde_json::from_str(&envelope.body).map_err(|_| ScrapeError::UpstreamFailed {
        stage: FetchStage::Fallback,
        status: envelope.status,
    })
}
