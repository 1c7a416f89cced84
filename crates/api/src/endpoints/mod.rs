//! API endpoints.

mod calls;
mod device_tokens;
mod ip_blocks;
mod tables;

use axum::{Json, Router};
use serde_json::{Value, json};
use tower_http::limit::RequestBodyLimitLayer;

use crate::middleware::AppState;
use crate::rate_limit::RateLimiterState;
use crate::sse;

/// Request bodies are small JSON documents.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Create the API router, mounted under `/api`.
pub fn router(limiter: RateLimiterState) -> Router<AppState> {
    Router::new()
        .nest("/calls", calls::router(limiter))
        .nest("/tables", tables::router())
        .nest("/device-tokens", device_tokens::router())
        .nest("/ip-blocks", ip_blocks::router())
        .nest("/sse", sse::router())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
}

/// Liveness check.
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
