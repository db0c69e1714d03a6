//! HTTP server for the asset cache
//!
//! Provides /health and /asset?url=...&key=... endpoints.

use crate::types::{AssetQuery, HealthResponse};
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sharded_blob_cache::{AssetCache, AssetRequest};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

/// Shared state for the HTTP server
pub struct ServerState {
    pub cache: AssetCache,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(cache: AssetCache) -> Self {
        Self {
            cache,
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<ServerState>;

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/asset", get(get_asset))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn start_server(
    state: SharedState,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let router = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let cache_stats = state.cache.stats().await;
    let uptime_secs = (Utc::now() - state.started_at).num_seconds().max(0) as u64;

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs,
        cache: cache_stats,
    })
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// Serve an asset from the cache, fetching it on a miss
async fn get_asset(State(state): State<SharedState>, Query(query): Query<AssetQuery>) -> Response {
    let Some(fetch_url) = query.url else {
        return bad_request("Missing url parameter");
    };
    match url::Url::parse(&fetch_url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
        _ => return bad_request("Invalid url parameter"),
    }

    let mut request = AssetRequest::new(fetch_url);
    if let Some(key) = query.key.filter(|k| !k.is_empty()) {
        request = request.with_cache_key(key);
    }

    match state.cache.get_or_fetch(&request).await {
        Ok(asset) => {
            let cache_header = if asset.from_cache { "HIT" } else { "MISS" };
            let content_type = asset.record.content_type;
            let mut response = (
                StatusCode::OK,
                [(header::HeaderName::from_static("x-cache"), cache_header)],
                asset.record.payload,
            )
                .into_response();
            // An empty stored type keeps the octet-stream body default
            if !content_type.is_empty() {
                match header::HeaderValue::from_str(&content_type) {
                    Ok(value) => {
                        response.headers_mut().insert(header::CONTENT_TYPE, value);
                    }
                    Err(_) => warn!(content_type = %content_type, "Dropping invalid content type"),
                }
            }
            response
        }
        Err(e) => {
            warn!(url = %request.fetch_url, error = %e, "Failed to serve asset");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
