//! Health check endpoints.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HealthResponse {
    /// Service status: always "ok" while the process serves requests.
    pub status: String,

    pub service: String,

    pub version: String,

    /// Current timestamp (ISO 8601).
    pub timestamp: String,

    /// Number of distributions currently published.
    pub mounts: usize,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/livez", get(livez))
}

/// Liveness plus a summary of what is being served.
async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "bootd".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
        mounts: state.catalog().len(),
    })
}

async fn livez() -> impl IntoResponse {
    StatusCode::OK
}
