//! Scan API router.
//!
//! Layers (outermost → innermost): CORS → security headers → access log →
//! body limit → handler.

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::config::MAX_UPLOAD_BYTES;

/// Headroom for multipart boundaries and the text fields.
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

pub fn scan_api_router(ctx: ApiContext) -> Router {
    // The web client is served from a different origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(endpoints::health::info))
        .route("/health", get(endpoints::health::check))
        .route("/predict", post(endpoints::predict::scan_upload))
        .route("/predict/url", post(endpoints::predict::scan_url))
        .route("/history", get(endpoints::history::recent))
        .route("/stats", get(endpoints::stats::model_stats))
        .with_state(ctx)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + MULTIPART_OVERHEAD_BYTES))
        .layer(axum::middleware::from_fn(middleware::access::log_access))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(cors)
}
