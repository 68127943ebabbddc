use actix_web::{get, web, App, HttpResponse, HttpServer, Responder};
use log::{error, info};
use serde::Deserialize;
use serde_json::json;
use smartstore_scraper::browser::{BrowserConfig, BrowserManager};
use smartstore_scraper::config::Config;
use smartstore_scraper::error::ScrapeError;
use smartstore_scraper::scraper::HybridScraper;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct AppState {
    scraper: Arc<HybridScraper>,
    request_timeout: Duration,
}

#[derive(Deserialize)]
struct ScrapeQuery {
    #[serde(rename = "productUrl")]
    product_url: String,
}

fn status_for(error: &ScrapeError) -> actix_web::http::StatusCode {
    use actix_web::http::StatusCode;
    match error {
        ScrapeError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        ScrapeError::BrowserUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        ScrapeError::ExtractionFailed(_)
        | ScrapeError::RateLimited { .. }
        | ScrapeError::UpstreamFailed { .. }
        | ScrapeError::Transport { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[get("/scrape")]
async fn scrape_product(
    data: web::Data<AppState>,
    query: web::Query<ScrapeQuery>,
) -> impl Responder {
    let started = Instant::now();
    let product_url = query.product_url.clone();

    // The pipeline runs as its own task so an expired deadline abandons the
    // wait without skipping the pipeline's tab cleanup
    let scraper = Arc::clone(&data.scraper);
    let task = tokio::spawn(async move { scraper.scrape(&product_url).await });

    let outcome = tokio::time::timeout(data.request_timeout, task).await;
    let latency = format!("{:.2}s", started.elapsed().as_secs_f64());

    match outcome {
        Err(_) => {
            error!("Request deadline exceeded after {}", latency);
            HttpResponse::GatewayTimeout().json(json!({
                "success": false,
                "latency": latency,
                "message": "Scrape did not complete within the request deadline.",
            }))
        }
        Ok(Err(join_error)) => {
            error!("Scrape task panicked: {}", join_error);
            HttpResponse::InternalServerError().json(json!({
                "success": false,
                "latency": latency,
                "message": "Internal scrape task failure.",
            }))
        }
        Ok(Ok(Ok(result))) => {
            info!("Request successful. Latency: {}", latency);
            HttpResponse::Ok().json(json!({
                "success": true,
                "latency": latency,
                "data": result,
            }))
        }
        Ok(Ok(Err(e))) => {
            error!("Request failed. Latency: {}. Error: {}", latency, e);
            HttpResponse::build(status_for(&e)).json(json!({
                "success": false,
                "latency": latency,
                "message": "Failed to scrape product data.",
                "error": e.to_string(),
            }))
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    log4rs::init_file("log4rs.yml", Default::default()).unwrap();

    let config = Config::load();
    let proxy = Config::proxy_from_env();
    if proxy.is_some() {
        info!("Outbound proxy configured from environment");
    }

    let browser_config = BrowserConfig::from_settings(&config.browser, proxy.as_ref());
    let manager = Arc::new(BrowserManager::new(browser_config));

    // Eager launch so the first request does not pay browser startup latency
    info!("Launching persistent browser instance...");
    manager.acquire().map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("browser launch failed: {}", e),
        )
    })?;
    info!("Browser ready.");

    let scraper = Arc::new(HybridScraper::new(
        config.scrape.clone(),
        Arc::clone(&manager),
    ));
    let request_timeout = Duration::from_secs(config.scrape.request_timeout_secs);

    let addr = format!("0.0.0.0:{}", config.port);
    info!("Listening on {}", addr);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(AppState {
                scraper: Arc::clone(&scraper),
                request_timeout,
            }))
            .service(scrape_product)
    })
    .bind(&addr)?
    .run()
    .await;

    info!("Shutting down, releasing browser");
    manager.release();
    server
}
