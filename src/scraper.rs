//! Hybrid orchestrator: browser bootstrap, then fast HTTP fetch, with a
//! single-tier in-browser escalation when the details call is rate limited.
//!
//! A scrape moves through: validate input -> bootstrap (browser) -> extract
//! channelUid -> direct fetch -> optional fallback -> close tab. Input
//! validation happens before any browser or network resource is touched.
//! The tab opened by the bootstrap is closed exactly once on every exit
//! path; page contexts are never pooled or reused across requests, which
//! costs latency but rules out state bleed between unrelated scrapes.

use crate::bootstrap::{self, BootstrapOutcome, SessionBootstrapper};
use crate::browser::BrowserManager;
use crate::config::{Config, ScrapeConfig};
use crate::error::ScrapeError;
use crate::fallback;
use crate::fetcher::{DirectFetchError, DirectFetcher};
use crate::models::{ScrapeResult, TargetReference};
use crate::session_store::SessionStore;
use std::sync::Arc;

/// Known nesting paths for the channel identifier, tried in order.
///
/// The site has shipped both shapes; checking only the first is a latent
/// correctness gap.
const CHANNEL_UID_PATHS: &[&[&str]] = &[
    &["app", "channel", "channelUid"],
    &["smartStoreV2", "channel", "channelUid"],
];

/// Walk the embedded state through each known path until one yields a
/// non-empty string
pub fn extract_channel_uid(state: &serde_json::Value) -> Option<String> {
    CHANNEL_UID_PATHS
        .iter()
        .find_map(|path| lookup_string_path(state, path))
}

fn lookup_string_path(state: &serde_json::Value, path: &[&str]) -> Option<String> {
    let mut current = state;
    for key in path {
        current = current.get(key)?;
    }
    current
        .as_str()
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

pub struct HybridScraper {
    manager: Arc<BrowserManager>,
    store: Arc<SessionStore>,
    bootstrapper: Arc<SessionBootstrapper>,
    config: ScrapeConfig,
}

impl HybridScraper {
    pub fn new(config: ScrapeConfig, manager: Arc<BrowserManager>) -> Self {
        let store = Arc::new(SessionStore::new(&config.cookie_file));
        let bootstrapper = Arc::new(SessionBootstrapper::new(
            config.clone(),
            Arc::clone(&store),
        ));
        Self {
            manager,
            store,
            bootstrapper,
            config,
        }
    }

    /// Run the full pipeline for one product URL.
    ///
    /// Browser phases run on the blocking pool so a multi-second navigation
    /// never stalls unrelated requests.
    pub async fn scrape(&self, product_url: &str) -> Result<ScrapeResult, ScrapeError> {
        let target = TargetReference::from_url(product_url)?;
        log::info!(
            "Scrape started: store={} product={}",
            target.store_name,
            target.product_id
        );

        let outcome = self.bootstrap_phase(product_url).await?;
        let tab = Arc::clone(&outcome.tab);

        let result = self.fetch_phase(product_url, &target, &outcome).await;

        if result.is_err() {
            // The page is still open; grab a screenshot before cleanup so
            // the operator can see what the site actually served
            let bootstrapper = Arc::clone(&self.bootstrapper);
            let shot_tab = Arc::clone(&tab);
            let _ = tokio::task::spawn_blocking(move || bootstrapper.capture_diagnostics(&shot_tab))
                .await;
        }

        let close_tab = Arc::clone(&tab);
        let _ = tokio::task::spawn_blocking(move || bootstrap::close_tab(&close_tab)).await;

        match &result {
            Ok(_) => log::info!("Scrape completed for product {}", target.product_id),
            Err(e) => log::error!("Scrape failed for product {}: {}", target.product_id, e),
        }
        result
    }

    async fn bootstrap_phase(&self, product_url: &str) -> Result<BootstrapOutcome, ScrapeError> {
        let manager = Arc::clone(&self.manager);
        let store = Arc::clone(&self.store);
        let bootstrapper = Arc::clone(&self.bootstrapper);
        let url = product_url.to_string();
        let proxy = Config::proxy_from_env();

        tokio::task::spawn_blocking(move || {
            let browser = manager.acquire()?;

            // A bad cookie file is reported but never blocks a fresh bootstrap
            let prior_cookies = match store.load() {
                Ok(cookies) => cookies,
                Err(e) => {
                    log::error!("Stored session unusable, bootstrapping cold: {}", e);
                    None
                }
            };

            bootstrapper.bootstrap(&browser, &url, prior_cookies, proxy)
        })
        .await
        .map_err(|e| ScrapeError::Internal(format!("bootstrap task: {}", e)))?
    }

    async fn fetch_phase(
        &self,
        product_url: &str,
        target: &TargetReference,
        outcome: &BootstrapOutcome,
    ) -> Result<ScrapeResult, ScrapeError> {
        let channel_uid = extract_channel_uid(&outcome.state).ok_or_else(|| {
            ScrapeError::ExtractionFailed("channelUid not found in embedded state".to_string())
        })?;

        // Both identifiers must be present before any API call goes out
        if target.product_id.is_empty() || channel_uid.is_empty() {
            return Err(ScrapeError::ExtractionFailed(
                "empty product or channel identifier".to_string(),
            ));
        }
        log::info!("Extracted channelUid {}", channel_uid);

        let fetcher = DirectFetcher::new(&self.config, outcome.session.proxy.as_ref())?;

        match fetcher
            .fetch_both(product_url, target, &channel_uid, &outcome.session)
            .await
        {
            Ok(result) => Ok(result),
            Err(DirectFetchError::Benefits(error)) => Err(error),
            Err(DirectFetchError::Details { benefits, error }) if error.is_rate_limit() => {
                // Single-tier escalation: re-issue the details call from
                // inside the live page. Any other failure propagates as-is,
                // and the fallback itself is never retried.
                log::warn!("Details call rate limited, escalating to in-browser fetch");
                let details_url = fetcher.details_url(target, &channel_uid);
                let tab = Arc::clone(&outcome.tab);

                let details = tokio::task::spawn_blocking(move || {
                    fallback::fetch_via_browser(&tab, &details_url)
                })
                .await
                .map_err(|e| ScrapeError::Internal(format!("fallback task: {}", e)))??;

                Ok(ScrapeResult {
                    benefits_data: benefits,
                    product_details_data: details,
                })
            }
            Err(DirectFetchError::Details { error, .. }) => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_channel_uid_primary_path() {
        let state = json!({
            "app": { "channel": { "channelUid": "primary-uid" } },
            "smartStoreV2": { "channel": { "channelUid": "secondary-uid" } }
        });
        assert_eq!(extract_channel_uid(&state).as_deref(), Some("primary-uid"));
    }

    #[test]
    fn test_channel_uid_secondary_path_only() {
        let state = json!({
            "smartStoreV2": { "channel": { "channelUid": "secondary-uid" } }
        });
        assert_eq!(
            extract_channel_uid(&state).as_deref(),
            Some("secondary-uid")
        );
    }

    #[test]
    fn test_channel_uid_missing() {
        let state = json!({ "app": { "channel": {} }, "other": 1 });
        assert_eq!(extract_channel_uid(&state), None);
    }

    #[test]
    fn test_channel_uid_empty_string_rejected() {
        let state = json!({ "app": { "channel": { "channelUid": "" } } });
        assert_eq!(extract_channel_uid(&state), None);
    }

    #[test]
    fn test_channel_uid_non_string_rejected() {
        let state = json!({ "app": { "channel": { "channelUid": 42 } } });
        assert_eq!(extract_channel_uid(&state), None);
    }
}
