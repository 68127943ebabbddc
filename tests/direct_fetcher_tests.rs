//! Direct fetcher tests against a local mock of the two product APIs.

use serde_json::json;
use smartstore_scraper::config::ScrapeConfig;
use smartstore_scraper::error::{FetchStage, ScrapeError};
use smartstore_scraper::fetcher::{DirectFetchError, DirectFetcher};
use smartstore_scraper::models::{Session, StoredCookie, TargetReference};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(base_url: &str) -> ScrapeConfig {
    ScrapeConfig {
        base_url: base_url.to_string(),
        // No need to be polite to a local mock
        fetch_delay_min_ms: 0,
        fetch_delay_max_ms: 0,
        ..ScrapeConfig::default()
    }
}

fn test_session() -> Session {
    Session {
        cookies: vec![
            StoredCookie {
                name: "NNB".to_string(),
                value: "COOKIE1".to_string(),
                domain: ".naver.com".to_string(),
                path: "/".to_string(),
                expires: None,
                same_site: None,
            },
            StoredCookie {
                name: "nid_b".to_string(),
                value: "COOKIE2".to_string(),
                domain: ".naver.com".to_string(),
                path: "/".to_string(),
                expires: None,
                same_site: Some("Lax".to_string()),
            },
        ],
        user_agent: "test-agent".to_string(),
        proxy: None,
    }
}

fn target() -> TargetReference {
    TargetReference {
        store_name: "acme-store".to_string(),
        product_id: "123456789".to_string(),
    }
}

const TARGET_URL: &str = "https://smartstore.naver.com/acme-store/products/123456789";

#[tokio::test]
async fn fetch_both_returns_both_bodies() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/benefits/by-product"))
        .and(query_param("productId", "123456789"))
        .and(header("Cookie", "NNB=COOKIE1; nid_b=COOKIE2"))
        .and(header("Referer", TARGET_URL))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"benefits": ["coupon"]})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/i/v2/channels/uid-1/products/123456789"))
        .and(query_param("withWindow", "false"))
        .and(header("Cookie", "NNB=COOKIE1; nid_b=COOKIE2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "Widget"})))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = DirectFetcher::new(&test_config(&server.uri()), None).unwrap();
    let result = fetcher
        .fetch_both(TARGET_URL, &target(), "uid-1", &test_session())
        .await
        .unwrap();

    assert_eq!(result.benefits_data["benefits"][0], "coupon");
    assert_eq!(result.product_details_data["name"], "Widget");
}

#[tokio::test]
async fn rate_limited_details_is_typed_and_keeps_benefits() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/benefits/by-product"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"benefits": []})))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/i/v2/channels/uid-1/products/123456789"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let fetcher = DirectFetcher::new(&test_config(&server.uri()), None).unwrap();
    let err = fetcher
        .fetch_both(TARGET_URL, &target(), "uid-1", &test_session())
        .await
        .unwrap_err();

    match err {
        DirectFetchError::Details { benefits, error } => {
            assert!(benefits.get("benefits").is_some());
            assert!(matches!(error, ScrapeError::RateLimited { status: 429 }));
        }
        other => panic!("expected Details failure, got {:?}", other),
    }
}

#[tokio::test]
async fn benefits_failure_aborts_before_details() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/benefits/by-product"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    // The details endpoint must never be called when benefits already failed
    Mock::given(method("GET"))
        .and(path("/i/v2/channels/uid-1/products/123456789"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let fetcher = DirectFetcher::new(&test_config(&server.uri()), None).unwrap();
    let err = fetcher
        .fetch_both(TARGET_URL, &target(), "uid-1", &test_session())
        .await
        .unwrap_err();

    match err {
        DirectFetchError::Benefits(ScrapeError::UpstreamFailed { stage, status }) => {
            assert_eq!(stage, FetchStage::Benefits);
            assert_eq!(status, 500);
        }
        other => panic!("expected Benefits upstream failure, got {:?}", other),
    }
}

#[tokio::test]
async fn non_rate_limit_details_failure_is_not_rate_limited() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/benefits/by-product"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/i/v2/channels/uid-1/products/123456789"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let fetcher = DirectFetcher::new(&test_config(&server.uri()), None).unwrap();
    let err = fetcher
        .fetch_both(TARGET_URL, &target(), "uid-1", &test_session())
        .await
        .unwrap_err();

    match err {
        DirectFetchError::Details { error, .. } => {
            assert!(!error.is_rate_limit());
            assert!(matches!(
                error,
                ScrapeError::UpstreamFailed {
                    stage: FetchStage::Details,
                    status: 403
                }
            ));
        }
        other => panic!("expected Details failure, got {:?}", other),
    }
}

#[tokio::test]
async fn rate_limited_benefits_propagates_without_details_call() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/benefits/by-product"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let fetcher = DirectFetcher::new(&test_config(&server.uri()), None).unwrap();
    let err = fetcher
        .fetch_both(TARGET_URL, &target(), "uid-1", &test_session())
        .await
        .unwrap_err();

    // A rate limit on the first call is a plain failure; the in-browser
    // escalation is reserved for the details call
    assert!(matches!(
        err,
        DirectFetchError::Benefits(ScrapeError::RateLimited { status: 429 })
    ));
}
