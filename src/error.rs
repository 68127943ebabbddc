use crate::browser::BrowserError;
use std::fmt;

/// Which API call a fetch error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStage {
    Benefits,
    Details,
    Fallback,
}

impl fmt::Display for FetchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchStage::Benefits => write!(f, "benefits"),
            FetchStage::Details => write!(f, "product-details"),
            FetchStage::Fallback => write!(f, "browser-fallback"),
        }
    }
}

/// Errors that can occur during a scrape operation
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("invalid product URL: {0}")]
    InvalidInput(String),

    #[error("browser unavailable: {0}")]
    BrowserUnavailable(#[from] BrowserError),

    #[error("embedded state extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("rate limited by upstream (status {status})")]
    RateLimited { status: u16 },

    #[error("{stage} request failed with status {status}")]
    UpstreamFailed { stage: FetchStage, status: u16 },

    #[error("{stage} request failed: {source}")]
    Transport {
        stage: FetchStage,
        source: reqwest::Error,
    },

    #[error("session store error: {0}")]
    SessionStore(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal task error: {0}")]
    Internal(String),
}

impl ScrapeError {
    /// True when the single-tier in-browser escalation applies
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, ScrapeError::RateLimited { .. })
    }
}
