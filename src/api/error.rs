//! API error types with structured JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::pipeline::types::ScanError;

/// Error response body. `detail` is the field web clients display.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
    pub code: &'static str,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, detail) = match self {
            ApiError::Scan(ScanError::BadInput(reason)) => (
                StatusCode::BAD_REQUEST,
                "BAD_INPUT",
                format!("Bad input: {reason}"),
            ),
            ApiError::Scan(ScanError::UpstreamUnavailable(source)) => (
                StatusCode::BAD_REQUEST,
                "UPSTREAM_UNAVAILABLE",
                upstream_message(&source),
            ),
            ApiError::Scan(ScanError::ServiceUnavailable) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "MODEL_NOT_LOADED",
                "Model not loaded".to_string(),
            ),
            ApiError::Scan(ScanError::InferenceError(reason)) => {
                tracing::error!(reason = %reason, "Inference failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INFERENCE_FAILED",
                    "Prediction failed".to_string(),
                )
            }
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail),
            ApiError::Internal(detail) => {
                tracing::error!(detail = %detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                )
            }
        };

        (status, Json(ErrorBody { detail, code })).into_response()
    }
}

fn upstream_message(source: &str) -> String {
    match source {
        "ocr" => "Could not read text from the image".to_string(),
        "scrape" => "Could not scrape a headline and image from this URL".to_string(),
        other => format!("Upstream unavailable: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn scan_errors_map_to_status_codes() {
        let cases = [
            (ScanError::BadInput("no readable text".into()), StatusCode::BAD_REQUEST),
            (ScanError::UpstreamUnavailable("scrape".into()), StatusCode::BAD_REQUEST),
            (ScanError::ServiceUnavailable, StatusCode::SERVICE_UNAVAILABLE),
            (ScanError::InferenceError("nan".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }

    #[tokio::test]
    async fn body_carries_detail_and_code() {
        let response =
            ApiError::from(ScanError::BadInput("no readable text".into())).into_response();
        let body = body_json(response).await;
        assert_eq!(body["detail"], "Bad input: no readable text");
        assert_eq!(body["code"], "BAD_INPUT");
    }

    #[tokio::test]
    async fn internal_details_are_hidden() {
        let response = ApiError::Internal("db path /secret".into()).into_response();
        let body = body_json(response).await;
        assert_eq!(body["detail"], "An internal error occurred");
    }

    #[tokio::test]
    async fn inference_details_are_hidden() {
        let response =
            ApiError::from(ScanError::InferenceError("shape [1,3]".into())).into_response();
        let body = body_json(response).await;
        assert_eq!(body["detail"], "Prediction failed");
    }
}
