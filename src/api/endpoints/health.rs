//! Liveness and service info.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::types::ApiContext;

#[derive(Serialize)]
pub struct InfoResponse {
    pub status: &'static str,
    pub model: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// `GET /`: service info, including whether the classifier is loaded.
pub async fn info(State(ctx): State<ApiContext>) -> Json<InfoResponse> {
    let model = if ctx.orchestrator.registry().is_ready() {
        "loaded"
    } else {
        "unloaded"
    };
    Json(InfoResponse {
        status: "online",
        model,
        version: crate::config::APP_VERSION,
    })
}

/// `GET /health`
pub async fn check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}
