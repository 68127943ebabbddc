//! Browser-driven session bootstrap.
//!
//! Drives one tab through a human-like warm-up: landing page first, then the
//! product page with the landing page as referrer. Direct cold navigation to
//! the product URL is what trips the site's bot detection, so the two-hop
//! path is not optional. On success the tab is handed back still open so the
//! fallback fetcher can reuse its network identity; the orchestrator owns
//! closing it.

use crate::browser::BrowserError;
use crate::config::ScrapeConfig;
use crate::error::ScrapeError;
use crate::models::{ProxyIdentity, Session, StoredCookie};
use crate::session_store::{sanitize_cookies, SessionStore};
use headless_chrome::protocol::cdp::Network::{Cookie, CookieParam, CookieSameSite};
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, Tab};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Desktop-class user agents rotated per bootstrap to avoid a uniform
/// fingerprint across calls
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
];

/// Overrides the page-visible automation signals before navigation
const STEALTH_SCRIPT: &str = r#"
    Object.defineProperty(navigator, 'webdriver', {
        get: () => undefined
    });
    Object.defineProperty(navigator, 'plugins', {
        get: () => [1, 2, 3, 4, 5]
    });
    Object.defineProperty(navigator, 'languages', {
        get: () => ['ko-KR', 'ko', 'en-US', 'en']
    });
    window.chrome = window.chrome || { runtime: {} };
"#;

/// A captured session plus the still-open tab that produced it
pub struct BootstrapOutcome {
    pub session: Session,
    pub state: serde_json::Value,
    pub tab: Arc<Tab>,
}

pub struct SessionBootstrapper {
    config: ScrapeConfig,
    store: Arc<SessionStore>,
}

impl SessionBootstrapper {
    pub fn new(config: ScrapeConfig, store: Arc<SessionStore>) -> Self {
        Self { config, store }
    }

    /// Obtain a valid session and the page's embedded state.
    ///
    /// Each step's failure aborts the remainder; the tab is closed on every
    /// failure path. On success the tab is returned open.
    pub fn bootstrap(
        &self,
        browser: &Browser,
        target_url: &str,
        prior_cookies: Option<Vec<StoredCookie>>,
        proxy: Option<ProxyIdentity>,
    ) -> Result<BootstrapOutcome, ScrapeError> {
        let tab = browser
            .new_tab()
            .map_err(|e| BrowserError::TabCreationError(e.to_string()))?;

        match self.drive(&tab, target_url, prior_cookies, proxy) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                close_tab(&tab);
                Err(e)
            }
        }
    }

    fn drive(
        &self,
        tab: &Arc<Tab>,
        target_url: &str,
        prior_cookies: Option<Vec<StoredCookie>>,
        proxy: Option<ProxyIdentity>,
    ) -> Result<BootstrapOutcome, ScrapeError> {
        // Prior cookies are best-effort; a cookie the engine rejects should
        // not sink the whole bootstrap
        if let Some(cookies) = prior_cookies {
            let sanitized = sanitize_cookies(cookies);
            if !sanitized.is_empty() {
                log::info!("Seeding tab with {} stored cookies", sanitized.len());
                let params: Vec<CookieParam> = sanitized.iter().map(to_cookie_param).collect();
                if let Err(e) = tab.set_cookies(params) {
                    log::warn!("Failed to install stored cookies: {}", e);
                }
            }
        }

        // Proxy credentials must be in place before the first request, or
        // navigation dies with an auth error
        if let Some(ref p) = proxy {
            if p.username.is_some() {
                tab.authenticate(p.username.clone(), p.password.clone())
                    .map_err(|e| BrowserError::NavigationError(format!(
                        "proxy authentication failed: {}",
                        e
                    )))?;
            }
        }

        let user_agent = random_user_agent();
        self.randomize_fingerprint(tab, user_agent)?;

        tab.evaluate(STEALTH_SCRIPT, false)
            .map_err(|e| BrowserError::JavaScriptError(e.to_string()))?;

        // Two-hop warm-up: generic landing page first, then the target with
        // the landing page as referrer
        log::info!("Warm-up navigation to {}", self.config.landing_url);
        self.navigate_and_settle(tab, &self.config.landing_url)?;
        jitter_mouse(tab);
        sleep_range(
            self.config.warmup_delay_min_ms,
            self.config.warmup_delay_max_ms,
        );

        let mut headers = HashMap::new();
        headers.insert("Referer", self.config.landing_url.as_str());
        tab.set_extra_http_headers(headers)
            .map_err(|e| BrowserError::NavigationError(e.to_string()))?;

        log::info!("Navigating to target {}", target_url);
        self.navigate_and_settle(tab, target_url)?;
        jitter_mouse(tab);

        let state = self.read_embedded_state(tab)?;

        let raw_cookies = tab
            .get_cookies()
            .map_err(|e| BrowserError::CookieError(e.to_string()))?;
        let cookies = sanitize_cookies(raw_cookies.into_iter().map(from_network_cookie).collect());

        // Persist before returning so a process restart can reuse the session
        self.store.save(&cookies)?;

        let session = Session {
            cookies,
            user_agent: user_agent.to_string(),
            proxy,
        };

        Ok(BootstrapOutcome {
            session,
            state,
            tab: Arc::clone(tab),
        })
    }

    /// Per-call viewport and user-agent jitter
    fn randomize_fingerprint(&self, tab: &Arc<Tab>, user_agent: &str) -> Result<(), ScrapeError> {
        let (width, height) = {
            let mut rng = rand::thread_rng();
            (rng.gen_range(1280..=1920), rng.gen_range(800..=1080))
        };

        tab.set_bounds(headless_chrome::types::Bounds::Normal {
            left: Some(0),
            top: Some(0),
            width: Some(width as f64),
            height: Some(height as f64),
        })
        .map_err(|e| BrowserError::ConfigurationError(e.to_string()))?;

        tab.set_user_agent(user_agent, None, None)
            .map_err(|e| BrowserError::ConfigurationError(e.to_string()))?;

        Ok(())
    }

    fn navigate_and_settle(&self, tab: &Arc<Tab>, url: &str) -> Result<(), ScrapeError> {
        tab.navigate_to(url)
            .map_err(|e| BrowserError::NavigationError(format!("{}: {}", url, e)))?;
        tab.wait_until_navigated()
            .map_err(|e| BrowserError::NavigationError(format!("{}: {}", url, e)))?;
        tab.wait_for_element_with_custom_timeout(
            "body",
            Duration::from_secs(self.config.nav_timeout_secs),
        )
        .map_err(|e| BrowserError::Timeout(format!("body on {}: {}", url, e)))?;

        // Let in-flight XHR and client-side rendering finish
        sleep_range(800, 1500);
        Ok(())
    }

    /// Read `window.__PRELOADED_STATE__`; its absence means the site served
    /// a detection/challenge variant instead of the real page.
    fn read_embedded_state(&self, tab: &Arc<Tab>) -> Result<serde_json::Value, ScrapeError> {
        let result = tab
            .evaluate(
                "JSON.stringify(window.__PRELOADED_STATE__ || null)",
                false,
            )
            .map_err(|e| BrowserError::JavaScriptError(e.to_string()))?;

        let raw = result
            .value
            .as_ref()
            .and_then(|v| v.as_str())
            .unwrap_or("null")
            .to_string();

        let state: serde_json::Value = serde_json::from_str(&raw)?;

        let empty = match &state {
            serde_json::Value::Null => true,
            serde_json::Value::Object(map) => map.is_empty(),
            _ => false,
        };

        if empty {
            log::error!("Embedded page state missing; capturing diagnostic screenshot");
            self.capture_diagnostics(tab);
            return Err(ScrapeError::ExtractionFailed(
                "page has no embedded state (likely served a challenge page)".to_string(),
            ));
        }

        Ok(state)
    }

    /// Best-effort full-page screenshot for operator diagnosis
    pub fn capture_diagnostics(&self, tab: &Arc<Tab>) {
        let shot = tab.capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true);
        match shot {
            Ok(data) => {
                if let Err(e) = std::fs::write(&self.config.screenshot_path, data) {
                    log::warn!(
                        "Failed to write screenshot {}: {}",
                        self.config.screenshot_path,
                        e
                    );
                } else {
                    log::info!("Diagnostic screenshot saved to {}", self.config.screenshot_path);
                }
            }
            Err(e) => log::warn!("Failed to capture screenshot: {}", e),
        }
    }
}

/// Close a tab, logging rather than propagating failure; used on every
/// pipeline exit path
pub(crate) fn close_tab(tab: &Arc<Tab>) {
    if let Err(e) = tab.close(true) {
        log::warn!("Failed to close tab: {}", e);
    }
}

fn random_user_agent() -> &'static str {
    let mut rng = rand::thread_rng();
    USER_AGENTS[rng.gen_range(0..USER_AGENTS.len())]
}

fn sleep_range(min_ms: u64, max_ms: u64) {
    let delay = if max_ms > min_ms {
        rand::thread_rng().gen_range(min_ms..=max_ms)
    } else {
        min_ms
    };
    std::thread::sleep(Duration::from_millis(delay));
}

/// Dispatch a couple of randomized pointer events; best-effort human noise
fn jitter_mouse(tab: &Arc<Tab>) {
    let (x, y) = {
        let mut rng = rand::thread_rng();
        (rng.gen_range(100..900), rng.gen_range(100..700))
    };
    let script = format!(
        "document.dispatchEvent(new MouseEvent('mousemove', {{clientX: {}, clientY: {}, bubbles: true}})); true",
        x, y
    );
    if let Err(e) = tab.evaluate(&script, false) {
        log::debug!("Mouse jitter dispatch failed: {}", e);
    }
}

fn to_cookie_param(c: &StoredCookie) -> CookieParam {
    CookieParam {
        name: c.name.clone(),
        value: c.value.clone(),
        url: None,
        domain: if c.domain.is_empty() {
            None
        } else {
            Some(c.domain.clone())
        },
        path: Some(c.path.clone()),
        secure: None,
        http_only: None,
        same_site: c.same_site.as_deref().and_then(same_site_from_str),
        expires: c.expires,
        priority: None,
        same_party: None,
        source_scheme: None,
        source_port: None,
        partition_key: None,
    }
}

fn from_network_cookie(c: Cookie) -> StoredCookie {
    StoredCookie {
        name: c.name,
        value: c.value,
        domain: c.domain,
        path: c.path,
        // The engine reports session cookies with a negative expiry
        expires: if c.expires > 0.0 { Some(c.expires) } else { None },
        same_site: c.same_site.map(|s| same_site_to_str(&s).to_string()),
    }
}

fn same_site_from_str(s: &str) -> Option<CookieSameSite> {
    match s {
        "Strict" => Some(CookieSameSite::Strict),
        "Lax" => Some(CookieSameSite::Lax),
        "None" => Some(CookieSameSite::None),
        _ => Option::None,
    }
}

fn same_site_to_str(s: &CookieSameSite) -> &'static str {
    match s {
        CookieSameSite::Strict => "Strict",
        CookieSameSite::Lax => "Lax",
        CookieSameSite::None => "None",
    }
}
