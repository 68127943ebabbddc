//! Core data model for the scrape pipeline
//!
//! These types flow between the bootstrapper, the direct fetcher and the
//! fallback fetcher. The API response bodies are passed through as opaque
//! JSON values; the target site's schema is not modeled here.

use crate::error::ScrapeError;
use regex::Regex;
use serde::{Deserialize, Serialize};

const PRODUCT_URL_PATTERN: &str = r"smartstore\.naver\.com/([a-zA-Z0-9_-]+)/products/(\d+)";

/// Store and product identifiers parsed from the input URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetReference {
    pub store_name: String,
    pub product_id: String,
}

impl TargetReference {
    /// Parse a SmartStore product URL into its store/product parts.
    ///
    /// Anything that does not match `smartstore.naver.com/<store>/products/<id>`
    /// is rejected before any network or browser resource is touched.
    pub fn from_url(url: &str) -> Result<Self, ScrapeError> {
        let re = Regex::new(PRODUCT_URL_PATTERN).unwrap();
        let caps = re.captures(url).ok_or_else(|| {
            ScrapeError::InvalidInput(format!("not a SmartStore product URL: {}", url))
        })?;

        Ok(Self {
            store_name: caps[1].to_string(),
            product_id: caps[2].to_string(),
        })
    }
}

/// One persisted cookie record.
///
/// The on-disk format uses camelCase keys; `expirationDate` is the legacy
/// field name written by browser cookie exporters and is folded into
/// `expires` on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCookie {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default = "default_cookie_path")]
    pub path: String,
    #[serde(
        default,
        alias = "expirationDate",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

fn default_cookie_path() -> String {
    "/".to_string()
}

/// Outbound proxy identity, consumed from the environment
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProxyIdentity {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ProxyIdentity {
    /// Proxy server URL without credentials, for the browser launch flag
    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Cookies and identity captured by a successful bootstrap.
///
/// Only ever produced by the bootstrapper; read-only afterwards.
#[derive(Debug, Clone)]
pub struct Session {
    pub cookies: Vec<StoredCookie>,
    pub user_agent: String,
    pub proxy: Option<ProxyIdentity>,
}

impl Session {
    /// Serialize the cookie set into a single `Cookie` header value
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Terminal output of a scrape: both API bodies, passed through opaquely
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeResult {
    pub benefits_data: serde_json::Value,
    pub product_details_data: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_product_url() {
        let target =
            TargetReference::from_url("https://smartstore.naver.com/acme-store/products/123456789")
                .unwrap();
        assert_eq!(target.store_name, "acme-store");
        assert_eq!(target.product_id, "123456789");
    }

    #[test]
    fn test_parse_url_without_products_segment() {
        let result = TargetReference::from_url("https://smartstore.naver.com/acme-store");
        assert!(matches!(result, Err(ScrapeError::InvalidInput(_))));
    }

    #[test]
    fn test_parse_url_wrong_host() {
        let result = TargetReference::from_url("https://example.com/acme-store/products/123");
        assert!(matches!(result, Err(ScrapeError::InvalidInput(_))));
    }

    #[test]
    fn test_parse_url_non_numeric_id() {
        let result =
            TargetReference::from_url("https://smartstore.naver.com/acme-store/products/abc");
        assert!(matches!(result, Err(ScrapeError::InvalidInput(_))));
    }

    #[test]
    fn test_cookie_header_serialization() {
        let session = Session {
            cookies: vec![
                StoredCookie {
                    name: "NNB".to_string(),
                    value: "ABCDEF".to_string(),
                    domain: ".naver.com".to_string(),
                    path: "/".to_string(),
                    expires: None,
                    same_site: None,
                },
                StoredCookie {
                    name: "nid_b".to_string(),
                    value: "xyz".to_string(),
                    domain: ".naver.com".to_string(),
                    path: "/".to_string(),
                    expires: Some(1900000000.0),
                    same_site: Some("Lax".to_string()),
                },
            ],
            user_agent: "test".to_string(),
            proxy: None,
        };
        assert_eq!(session.cookie_header(), "NNB=ABCDEF; nid_b=xyz");
    }

    #[test]
    fn test_cookie_legacy_expiry_field_alias() {
        let cookie: StoredCookie = serde_json::from_str(
            r#"{"name":"a","value":"b","domain":".naver.com","expirationDate":1900000000.5}"#,
        )
        .unwrap();
        assert_eq!(cookie.expires, Some(1900000000.5));

        // Serializing writes only the canonical field name
        let out = serde_json::to_string(&cookie).unwrap();
        assert!(out.contains("\"expires\""));
        assert!(!out.contains("expirationDate"));
    }

    #[test]
    fn test_proxy_server_url() {
        let proxy = ProxyIdentity {
            host: "127.0.0.1".to_string(),
            port: 8888,
            username: Some("user".to_string()),
            password: Some("pass".to_string()),
        };
        assert_eq!(proxy.server_url(), "http://127.0.0.1:8888");
    }
}
