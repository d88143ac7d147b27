//! OpenSearx STAC API Server
//!
//! Serves STAC item search over an OpenSearch granule feed or an
//! Elasticsearch catalog. Backend and dialect are chosen at start-up from
//! the environment.

use anyhow::{Context, Result};
use axum::{
    extract::{Path, RawQuery, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Serialize;
use std::{net::SocketAddr, sync::Arc};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

use opensearx_stac::{
    backend::Backend,
    catalog::{ItemCollection, STAC_VERSION},
    config::Config,
    pagination::RequestShape,
    request::{Limits, SearchBody, SearchParams, SearchRequest},
    SearchError,
};

// ============================================================================
// Application State
// ============================================================================

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    backend: Arc<Backend>,
    base_url: String,
    limits: Limits,
}

// ============================================================================
// Error Handling
// ============================================================================

/// API error type for consistent error responses
#[derive(Debug, Serialize)]
struct ApiError {
    code: String,
    description: String,
}

impl ApiError {
    fn bad_request(description: impl Into<String>) -> (StatusCode, Json<ApiError>) {
        (
            StatusCode::BAD_REQUEST,
            Json(ApiError {
                code: "BadRequest".into(),
                description: description.into(),
            }),
        )
    }

    fn from_search(err: SearchError) -> (StatusCode, Json<ApiError>) {
        let status = match err {
            SearchError::InvalidQueryParameter(_) => StatusCode::BAD_REQUEST,
            SearchError::NotFound(_) => StatusCode::NOT_FOUND,
            SearchError::Backend(_) => {
                warn!("Backend failure: {}", err);
                StatusCode::BAD_GATEWAY
            }
        };
        (
            status,
            Json(ApiError {
                code: err.code().into(),
                description: err.to_string(),
            }),
        )
    }
}

// ============================================================================
// Conformance Classes
// ============================================================================

/// STAC API conformance classes this implementation supports
const CONFORMANCE_CLASSES: &[&str] = &[
    "https://api.stacspec.org/v1.0.0/core",
    "https://api.stacspec.org/v1.0.0/collections",
    "https://api.stacspec.org/v1.0.0/item-search",
    "http://www.opengis.net/spec/ogcapi-features-1/1.0/conf/core",
    "http://www.opengis.net/spec/ogcapi-features-1/1.0/conf/geojson",
];

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration from environment
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Invalid configuration")?;

    info!(
        "Using {:?} backend at {} (dialect {})",
        config.backend,
        config.backend_url,
        config.dialect.name()
    );

    let backend = Backend::new(
        &config.backend_url,
        config.dialect.clone(),
        config.timeout,
        config.credentials.clone(),
    )
    .context("Failed to build backend client")?;

    let state = AppState {
        backend: Arc::new(backend),
        base_url: config.base_url.clone(),
        limits: config.limits,
    };

    let app = Router::new()
        .route("/", get(landing_page))
        .route("/conformance", get(conformance))
        .route("/collections", get(list_collections))
        .route("/collections/:collection_id", get(get_collection))
        .route("/search", get(search_items_get).post(search_items_post))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE, header::ACCEPT]),
        );

    let ip: std::net::IpAddr = config
        .host
        .parse()
        .with_context(|| format!("Invalid HOST {:?}", config.host))?;
    let addr = SocketAddr::new(ip, config.port);
    info!("Starting STAC API server on {}", addr);
    info!("Base URL: {}", config.base_url);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}

// ============================================================================
// Route Handlers
// ============================================================================

/// STAC API Landing Page
async fn landing_page(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "type": "Catalog",
        "id": "opensearx",
        "stac_version": STAC_VERSION,
        "title": "OpenSearx STAC API",
        "description": format!("STAC search over the {} catalog", state.backend.dialect().name()),
        "conformsTo": CONFORMANCE_CLASSES,
        "links": [
            {"rel": "self", "href": state.base_url, "type": "application/json"},
            {"rel": "root", "href": state.base_url, "type": "application/json"},
            {"rel": "conformance", "href": format!("{}/conformance", state.base_url), "type": "application/json"},
            {"rel": "data", "href": format!("{}/collections", state.base_url), "type": "application/json"},
            {"rel": "search", "href": format!("{}/search", state.base_url), "type": "application/geo+json", "method": "GET"},
            {"rel": "search", "href": format!("{}/search", state.base_url), "type": "application/geo+json", "method": "POST"}
        ]
    }))
}

/// STAC API Conformance
async fn conformance() -> impl IntoResponse {
    (
        [(header::CACHE_CONTROL, "public, max-age=86400")],
        Json(serde_json::json!({
            "conformsTo": CONFORMANCE_CLASSES
        })),
    )
}

/// List all collections
async fn list_collections(State(state): State<AppState>) -> impl IntoResponse {
    match state.backend.collections().await {
        Ok(collections) => Json(serde_json::json!({
            "collections": collections,
            "links": [
                {"rel": "self", "href": format!("{}/collections", state.base_url), "type": "application/json"},
                {"rel": "root", "href": state.base_url, "type": "application/json"}
            ]
        }))
        .into_response(),
        Err(e) => ApiError::from_search(e).into_response(),
    }
}

/// Get a specific collection
async fn get_collection(
    State(state): State<AppState>,
    Path(collection_id): Path<String>,
) -> impl IntoResponse {
    match state.backend.collection(&collection_id).await {
        Ok(collection) => Json(collection).into_response(),
        Err(e) => ApiError::from_search(e).into_response(),
    }
}

/// Search items (GET)
async fn search_items_get(
    State(state): State<AppState>,
    RawQuery(raw_query): RawQuery,
) -> impl IntoResponse {
    let request = match SearchParams::from_query(raw_query.as_deref())
        .and_then(|params| SearchRequest::from_params(params, &state.limits))
    {
        Ok(r) => r,
        Err(e) => return ApiError::from_search(e).into_response(),
    };

    let href = match raw_query {
        Some(q) if !q.is_empty() => format!("{}/search?{}", state.base_url, q),
        _ => format!("{}/search", state.base_url),
    };
    let url = match Url::parse(&href) {
        Ok(u) => u,
        Err(e) => {
            return ApiError::bad_request(format!("invalid request url: {}", e)).into_response()
        }
    };

    perform_search(&state, request, RequestShape::Get(url)).await
}

/// Search items (POST)
async fn search_items_post(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> impl IntoResponse {
    let body: SearchBody = match serde_json::from_value(body) {
        Ok(b) => b,
        Err(e) => {
            return ApiError::bad_request(format!("invalid search body: {}", e)).into_response()
        }
    };

    let request = match SearchRequest::from_body(body, &state.limits) {
        Ok(r) => r,
        Err(e) => return ApiError::from_search(e).into_response(),
    };

    let url = match Url::parse(&format!("{}/search", state.base_url)) {
        Ok(u) => u,
        Err(e) => {
            return ApiError::bad_request(format!("invalid base url: {}", e)).into_response()
        }
    };

    perform_search(&state, request, RequestShape::Post(url)).await
}

/// Run the backend search and attach navigation links
async fn perform_search(
    state: &AppState,
    request: SearchRequest,
    shape: RequestShape,
) -> axum::response::Response {
    let page = match state.backend.search(&request).await {
        Ok(p) => p,
        Err(e) => return ApiError::from_search(e).into_response(),
    };

    let links = state.backend.dialect().pager(&request, &page).links(&shape);

    (
        [(header::CACHE_CONTROL, "private, max-age=60")],
        Json(ItemCollection::new(page.items, page.total, links)),
    )
        .into_response()
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "stac_version": STAC_VERSION,
        "dialect": state.backend.dialect().name()
    }))
}
