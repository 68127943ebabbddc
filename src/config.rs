use crate::models::ProxyIdentity;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Port the HTTP front door binds to
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub scrape: ScrapeConfig,

    #[serde(default)]
    pub browser: BrowserSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScrapeConfig {
    /// API/site origin; overridable so tests can point at a local server
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// First hop of the two-hop warm-up navigation
    #[serde(default = "default_landing_url")]
    pub landing_url: String,

    /// Path of the single-slot session cookie file
    #[serde(default = "default_cookie_file")]
    pub cookie_file: String,

    /// Where the diagnostic screenshot is written on extraction failure
    #[serde(default = "default_screenshot_path")]
    pub screenshot_path: String,

    /// Overall per-request deadline enforced at the front door
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Bounds of the randomized pause between landing and target navigation
    #[serde(default = "default_warmup_delay_min")]
    pub warmup_delay_min_ms: u64,
    #[serde(default = "default_warmup_delay_max")]
    pub warmup_delay_max_ms: u64,

    /// Bounds of the randomized pause between the two API calls
    #[serde(default = "default_fetch_delay_min")]
    pub fetch_delay_min_ms: u64,
    #[serde(default = "default_fetch_delay_max")]
    pub fetch_delay_max_ms: u64,

    /// Timeout for the direct HTTP calls
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    /// Timeout for each browser navigation to settle
    #[serde(default = "default_nav_timeout")]
    pub nav_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BrowserSettings {
    #[serde(default = "default_true")]
    pub headless: bool,

    /// Persistent profile directory so fingerprint artifacts survive restarts
    #[serde(default = "default_user_data_dir")]
    pub user_data_dir: String,
}

fn default_port() -> u16 {
    8080
}
fn default_base_url() -> String {
    "https://smartstore.naver.com".to_string()
}
fn default_landing_url() -> String {
    "https://shopping.naver.com/".to_string()
}
fn default_cookie_file() -> String {
    "cookies.json".to_string()
}
fn default_screenshot_path() -> String {
    "extraction_failure.png".to_string()
}
fn default_request_timeout() -> u64 {
    90
}
fn default_warmup_delay_min() -> u64 {
    2000
}
fn default_warmup_delay_max() -> u64 {
    5000
}
fn default_fetch_delay_min() -> u64 {
    500
}
fn default_fetch_delay_max() -> u64 {
    1500
}
fn default_http_timeout() -> u64 {
    30
}
fn default_nav_timeout() -> u64 {
    30
}
fn default_true() -> bool {
    true
}
fn default_user_data_dir() -> String {
    "chrome-profile".to_string()
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            landing_url: default_landing_url(),
            cookie_file: default_cookie_file(),
            screenshot_path: default_screenshot_path(),
            request_timeout_secs: default_request_timeout(),
            warmup_delay_min_ms: default_warmup_delay_min(),
            warmup_delay_max_ms: default_warmup_delay_max(),
            fetch_delay_min_ms: default_fetch_delay_min(),
            fetch_delay_max_ms: default_fetch_delay_max(),
            http_timeout_secs: default_http_timeout(),
            nav_timeout_secs: default_nav_timeout(),
        }
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: default_true(),
            user_data_dir: default_user_data_dir(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            scrape: ScrapeConfig::default(),
            browser: BrowserSettings::default(),
        }
    }
}

impl Config {
    /// Load `config.toml` if present, falling back to defaults, then apply
    /// environment overrides (`PORT`).
    pub fn load() -> Self {
        let mut config = Self::default();

        let path = Path::new("config.toml");
        if path.exists() {
            if let Ok(content) = fs::read_to_string(path) {
                match toml::from_str::<Config>(&content) {
                    Ok(cfg) => config = cfg,
                    Err(e) => log::warn!("Ignoring malformed config.toml: {}", e),
                }
            }
        }

        if let Some(port) = env::var("PORT").ok().and_then(|p| p.parse().ok()) {
            config.port = port;
        }

        config
    }

    /// Proxy identity from the environment, if configured.
    ///
    /// `PROXY_HOST` and `PROXY_PORT` are both required; `PROXY_USER` and
    /// `PROXY_PASS` are optional.
    pub fn proxy_from_env() -> Option<ProxyIdentity> {
        let host = env::var("PROXY_HOST").ok()?;
        let port = env::var("PROXY_PORT").ok()?.parse().ok()?;

        Some(ProxyIdentity {
            host,
            port,
            username: env::var("PROXY_USER").ok(),
            password: env::var("PROXY_PASS").ok(),
        })
    }
}
