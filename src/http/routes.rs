//! Routes served by the guard binary itself.

use axum::http::{StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

/// Status routes: `GET /health` plus a JSON 404 fallback.
pub fn status_routes() -> Router {
    Router::new()
        .route("/health", get(health))
        .fallback(not_found)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn not_found(uri: Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "statusCode": StatusCode::NOT_FOUND.as_u16(),
            "message": format!("Cannot resolve {}", uri.path()),
        })),
    )
}
