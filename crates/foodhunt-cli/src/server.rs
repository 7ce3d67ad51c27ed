//! HTTP endpoint: one isolated pipeline run per request.
//!
//! Runs share nothing but the base configuration; a semaphore caps how many
//! browsers can be alive at once.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use foodhunt::{ScrapeConfig, ScrapeError, SearchQuery};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tower_http::cors::{Any, CorsLayer};

use crate::report::error_json;

/// Shared server state passed to all handlers via axum State.
pub struct AppState {
    config: ScrapeConfig,
    runs: Semaphore,
}

impl AppState {
    pub fn new(config: ScrapeConfig, max_runs: usize) -> Self {
        Self {
            config,
            runs: Semaphore::new(max_runs.max(1)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RestaurantsParams {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DealsParams {
    url: Option<String>,
    threshold: Option<f64>,
}

/// Body of `POST /deals`: restaurant pages scraped in one run.
#[derive(Debug, Deserialize)]
pub struct PagesBody {
    urls: Option<Vec<String>>,
    threshold: Option<f64>,
}

/// Build the axum Router with all endpoints.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/restaurants", get(restaurants))
        .route("/deals", get(deals).post(deals_for_pages))
        .layer(cors)
        .with_state(state)
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(addr: &str, config: ScrapeConfig, max_runs: usize) -> anyhow::Result<()> {
    let app = router(Arc::new(AppState::new(config, max_runs)));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, max_runs, "HTTP endpoint listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn restaurants(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RestaurantsParams>,
) -> Response {
    let query = match validate_url(params.url.as_deref()) {
        Ok(q) => q,
        Err(e) => return error_response(&e),
    };
    let Ok(_permit) = state.runs.acquire().await else {
        return unavailable();
    };

    match foodhunt::search_restaurants(query.as_str(), state.config.clone()).await {
        Ok(list) => Json(json!({"ok": true, "restaurants": list})).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn deals(State(state): State<Arc<AppState>>, Query(params): Query<DealsParams>) -> Response {
    let query = match validate_url(params.url.as_deref()) {
        Ok(q) => q,
        Err(e) => return error_response(&e),
    };
    let config = match with_threshold(&state.config, params.threshold) {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };
    let Ok(_permit) = state.runs.acquire().await else {
        return unavailable();
    };

    match foodhunt::run_with_config(query.as_str(), config).await {
        Ok(report) => Json(json!({"ok": true, "report": report})).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn deals_for_pages(
    State(state): State<Arc<AppState>>,
    body: Result<Json<PagesBody>, JsonRejection>,
) -> Response {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => {
            return error_response(&ScrapeError::InvalidQuery(rejection.body_text()));
        }
    };
    let urls = match validate_urls(body.urls) {
        Ok(urls) => urls,
        Err(e) => return error_response(&e),
    };
    let config = match with_threshold(&state.config, body.threshold) {
        Ok(c) => c,
        Err(e) => return error_response(&e),
    };
    let Ok(_permit) = state.runs.acquire().await else {
        return unavailable();
    };

    match foodhunt::deals_for_pages(&urls, config).await {
        Ok(report) => Json(json!({"ok": true, "report": report})).into_response(),
        Err(e) => error_response(&e),
    }
}

fn with_threshold(base: &ScrapeConfig, threshold: Option<f64>) -> Result<ScrapeConfig, ScrapeError> {
    let mut config = base.clone();
    if let Some(threshold) = threshold {
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(ScrapeError::InvalidQuery(format!(
                "threshold must be a non-negative number, got {threshold}"
            )));
        }
        config.threshold = threshold;
    }
    Ok(config)
}

fn validate_urls(urls: Option<Vec<String>>) -> Result<Vec<String>, ScrapeError> {
    let urls = urls.unwrap_or_default();
    if urls.is_empty() {
        return Err(ScrapeError::InvalidQuery("missing 'urls' list".into()));
    }
    for url in &urls {
        SearchQuery::parse(url)?;
    }
    Ok(urls)
}

fn validate_url(url: Option<&str>) -> Result<SearchQuery, ScrapeError> {
    match url {
        Some(url) if !url.trim().is_empty() => SearchQuery::parse(url),
        _ => Err(ScrapeError::InvalidQuery("missing 'url' parameter".into())),
    }
}

fn status_for(err: &ScrapeError) -> StatusCode {
    match err {
        ScrapeError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
        e if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::BAD_GATEWAY,
    }
}

fn error_response(err: &ScrapeError) -> Response {
    (status_for(err), Json(error_json(err))).into_response()
}

fn unavailable() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({"ok": false, "stage": "session", "error": "server is shutting down"})),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn app() -> Router {
        router(Arc::new(AppState::new(ScrapeConfig::default(), 1)))
    }

    async fn get_json(uri: &str) -> (StatusCode, Value) {
        let response = app()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn post_json(uri: &str, body: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get_json("/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn test_deals_requires_url() {
        let (status, body) = get_json("/deals").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["ok"], false);
        assert_eq!(body["stage"], "query");
    }

    #[tokio::test]
    async fn test_deals_rejects_bad_input() {
        let (status, _) = get_json("/deals?url=ftp%3A%2F%2Fexample.com").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) =
            get_json("/deals?url=https%3A%2F%2Fshopeefood.vn%2F&threshold=-5").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("threshold"));
    }

    #[tokio::test]
    async fn test_restaurants_requires_url() {
        let (status, body) = get_json("/restaurants?url=").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["stage"], "query");
    }

    #[tokio::test]
    async fn test_post_deals_requires_urls() {
        let (status, body) = post_json("/deals", r#"{"urls": []}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["ok"], false);
        assert_eq!(body["stage"], "query");

        let (status, body) = post_json("/deals", r#"{"threshold": 50}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("urls"));
    }

    #[tokio::test]
    async fn test_post_deals_rejects_bad_input() {
        let (status, body) = post_json(
            "/deals",
            r#"{"urls": ["https://shopeefood.vn/ho-chi-minh/quan-a", "not a url"]}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("not a url"));

        let (status, body) = post_json(
            "/deals",
            r#"{"urls": ["https://shopeefood.vn/ho-chi-minh/quan-a"], "threshold": -1}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("threshold"));

        let (status, body) = post_json("/deals", "{truncated").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["stage"], "query");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&ScrapeError::RunTimeout { timeout_ms: 1 }),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_for(&ScrapeError::Environment("no chromium".into())),
            StatusCode::BAD_GATEWAY
        );
    }
}
