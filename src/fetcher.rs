//! Fast HTTP path for the two product-data API calls.
//!
//! Uses the session captured by the bootstrap (cookies serialized into a
//! single `Cookie` header) instead of a browser. The two calls are issued
//! sequentially with a randomized pause between them rather than
//! concurrently; back-to-back calls from the same address are what trip the
//! rate limiter, and the latency cost of one short pause is acceptable.

use crate::config::ScrapeConfig;
use crate::error::{FetchStage, ScrapeError};
use crate::models::{ProxyIdentity, ScrapeResult, Session, TargetReference};
use rand::Rng;
use reqwest::header;
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// Desktop user agents for the direct API calls; a fresh one is chosen per
/// request
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
];

/// Outcome of a direct fetch where the first call may have succeeded even
/// though the second failed; the benefits body is retained so an escalation
/// does not refetch it
#[derive(Debug)]
pub enum DirectFetchError {
    Benefits(ScrapeError),
    Details {
        benefits: serde_json::Value,
        error: ScrapeError,
    },
}

pub struct DirectFetcher {
    client: Client,
    base_url: String,
    delay_bounds: (u64, u64),
}

impl DirectFetcher {
    pub fn new(config: &ScrapeConfig, proxy: Option<&ProxyIdentity>) -> Result<Self, ScrapeError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, "application/json".parse().unwrap());
        headers.insert(
            header::ACCEPT_LANGUAGE,
            "ko-KR,ko;q=0.9,en-US;q=0.8,en;q=0.7".parse().unwrap(),
        );

        let mut builder = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .gzip(true)
            .brotli(true)
            .default_headers(headers);

        if let Some(p) = proxy {
            let mut proxy = reqwest::Proxy::all(p.server_url())
                .map_err(|e| ScrapeError::Internal(format!("invalid proxy: {}", e)))?;
            if let (Some(user), Some(pass)) = (p.username.as_deref(), p.password.as_deref()) {
                proxy = proxy.basic_auth(user, pass);
            }
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| ScrapeError::Internal(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            delay_bounds: (config.fetch_delay_min_ms, config.fetch_delay_max_ms),
        })
    }

    pub fn benefits_url(&self, target: &TargetReference) -> String {
        format!(
            "{}/benefits/by-product?productId={}",
            self.base_url, target.product_id
        )
    }

    pub fn details_url(&self, target: &TargetReference, channel_uid: &str) -> String {
        format!(
            "{}/i/v2/channels/{}/products/{}?withWindow=false",
            self.base_url, channel_uid, target.product_id
        )
    }

    /// Issue both API calls with the captured session.
    ///
    /// A failure on the details call keeps the benefits body so the caller
    /// can escalate without repeating the first request.
    pub async fn fetch_both(
        &self,
        target_url: &str,
        target: &TargetReference,
        channel_uid: &str,
        session: &Session,
    ) -> Result<ScrapeResult, DirectFetchError> {
        let benefits = self
            .get_json(
                &self.benefits_url(target),
                FetchStage::Benefits,
                target_url,
                session,
            )
            .await
            .map_err(DirectFetchError::Benefits)?;

        self.pause_between_calls().await;

        match self
            .get_json(
                &self.details_url(target, channel_uid),
                FetchStage::Details,
                target_url,
                session,
            )
            .await
        {
            Ok(details) => Ok(ScrapeResult {
                benefits_data: benefits,
                product_details_data: details,
            }),
            Err(error) => Err(DirectFetchError::Details { benefits, error }),
        }
    }

    async fn get_json(
        &self,
        url: &str,
        stage: FetchStage,
        target_url: &str,
        session: &Session,
    ) -> Result<serde_json::Value, ScrapeError> {
        log::info!("Direct fetch ({}) {}", stage, url);

        let response = self
            .client
            .get(url)
            .header(header::USER_AGENT, random_user_agent())
            .header(header::REFERER, target_url)
            .header(header::COOKIE, session.cookie_header())
            .send()
            .await
            .map_err(|e| ScrapeError::Transport { stage, source: e })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            log::warn!("Rate limited on {} call (status {})", stage, status);
            return Err(ScrapeError::RateLimited {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(ScrapeError::UpstreamFailed {
                stage,
                status: status.as_u16(),
            });
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| ScrapeError::Transport { stage, source: e })
    }

    async fn pause_between_calls(&self) {
        let (min, max) = self.delay_bounds;
        let delay = if max > min {
            rand::thread_rng().gen_range(min..=max)
        } else {
            min
        };
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
}

fn random_user_agent() -> &'static str {
    let mut rng = rand::thread_rng();
    USER_AGENTS[rng.gen_range(0..USER_AGENTS.len())]
}
