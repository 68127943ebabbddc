use crate::config::BrowserSettings;
use crate::models::ProxyIdentity;
use std::path::PathBuf;

/// Configuration for the browser engine process
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Run browser in headless mode
    pub headless: bool,

    /// Browser window size
    pub window_size: (u32, u32),

    /// Persistent profile directory; fingerprint and session artifacts
    /// survive process restarts
    pub user_data_dir: PathBuf,

    /// Outbound proxy, passed as a launch flag
    pub proxy_server: Option<String>,

    /// Additional Chrome flags
    pub chrome_flags: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_size: (1920, 1080),
            user_data_dir: PathBuf::from("chrome-profile"),
            proxy_server: None,
            chrome_flags: stealth_flags(),
        }
    }
}

/// Launch flags that suppress the automation-detection signals
fn stealth_flags() -> Vec<String> {
    vec![
        "--disable-blink-features=AutomationControlled".to_string(),
        "--no-sandbox".to_string(),
        "--disable-setuid-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
    ]
}

impl BrowserConfig {
    /// Build launch configuration from app settings plus the optional proxy
    pub fn from_settings(settings: &BrowserSettings, proxy: Option<&ProxyIdentity>) -> Self {
        Self {
            headless: settings.headless,
            user_data_dir: PathBuf::from(&settings.user_data_dir),
            proxy_server: proxy.map(|p| p.server_url()),
            ..Self::default()
        }
    }
}
