use super::config::BrowserConfig;
use headless_chrome::{Browser, LaunchOptions};
use std::ffi::OsStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Owns the single long-lived browser engine process.
///
/// The process is launched on the first `acquire()` and shared by every
/// scrape afterwards. If the engine dies (crash, external kill), the stale
/// handle fails its liveness probe and the next `acquire()` relaunches
/// instead of handing out a dead handle.
pub struct BrowserManager {
    config: BrowserConfig,
    slot: Mutex<Option<Arc<Browser>>>,
}

impl BrowserManager {
    pub fn new(config: BrowserConfig) -> Self {
        Self {
            config,
            slot: Mutex::new(None),
        }
    }

    /// Launch the engine on first call, return the shared handle afterwards.
    ///
    /// Launch failure is propagated, not retried.
    pub fn acquire(&self) -> Result<Arc<Browser>, BrowserError> {
        let mut slot = self.slot.lock().unwrap();

        if let Some(browser) = slot.as_ref() {
            // Liveness probe; a handle whose process is gone is discarded
            if browser.get_version().is_ok() {
                return Ok(Arc::clone(browser));
            }
            log::warn!("Browser handle no longer responds; relaunching");
            *slot = None;
        }

        log::info!("Launching browser engine");
        let browser = Arc::new(Self::launch(&self.config)?);
        *slot = Some(Arc::clone(&browser));
        Ok(browser)
    }

    /// The current handle, failing if `acquire()` has not run yet
    pub fn current(&self) -> Result<Arc<Browser>, BrowserError> {
        self.slot
            .lock()
            .unwrap()
            .as_ref()
            .map(Arc::clone)
            .ok_or(BrowserError::NotInitialized)
    }

    pub fn is_initialized(&self) -> bool {
        self.slot.lock().unwrap().is_some()
    }

    /// Close the engine process and clear the slot; idempotent.
    ///
    /// The process terminates when the last handle drops, so an in-flight
    /// scrape holding a clone finishes before the kill takes effect.
    pub fn release(&self) {
        let mut slot = self.slot.lock().unwrap();
        if slot.take().is_some() {
            log::info!("Browser engine released");
        }
    }

    fn launch(config: &BrowserConfig) -> Result<Browser, BrowserError> {
        // Owned flag strings must outlive the LaunchOptions borrow
        let proxy_arg = config
            .proxy_server
            .as_ref()
            .map(|p| format!("--proxy-server={}", p));

        let mut args: Vec<&OsStr> = config
            .chrome_flags
            .iter()
            .map(|f| OsStr::new(f.as_str()))
            .collect();
        if let Some(ref proxy) = proxy_arg {
            args.push(OsStr::new(proxy));
        }

        let launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .window_size(Some(config.window_size))
            .args(args)
            .user_data_dir(Some(config.user_data_dir.clone()))
            // The singleton outlives individual requests; never reap it for
            // being idle between scrapes
            .idle_browser_timeout(Duration::from_secs(86_400))
            .build()
            .map_err(|e| BrowserError::ConfigurationError(e.to_string()))?;

        Browser::new(launch_options).map_err(|e| BrowserError::InitializationError(e.to_string()))
    }
}

/// Errors that can occur during browser operations
#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("browser initialization failed: {0}")]
    InitializationError(String),

    #[error("browser configuration error: {0}")]
    ConfigurationError(String),

    #[error("browser not initialized")]
    NotInitialized,

    #[error("tab creation failed: {0}")]
    TabCreationError(String),

    #[error("navigation error: {0}")]
    NavigationError(String),

    #[error("cookie operation failed: {0}")]
    CookieError(String),

    #[error("JavaScript execution error: {0}")]
    JavaScriptError(String),

    #[error("timeout waiting for: {0}")]
    Timeout(String),
}
