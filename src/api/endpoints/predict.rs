//! Scan endpoints: multipart upload and URL.

use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::pipeline::types::{Label, Provenance, ScanOutcome, ScanRequest};

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub scan_id: String,
    pub label: Label,
    pub confidence: f64,
    pub fake_probability: f64,
    pub summary: String,
    /// Resolved subject text: the supplied text, OCR output or scraped headline.
    pub scraped_headline: String,
    pub provenance: Provenance,
}

impl From<ScanOutcome> for PredictResponse {
    fn from(outcome: ScanOutcome) -> Self {
        Self {
            scan_id: outcome.scan_id.to_string(),
            label: outcome.label,
            confidence: outcome.confidence,
            fake_probability: outcome.fake_probability,
            summary: outcome.explanation,
            scraped_headline: outcome.subject_text,
            provenance: outcome.provenance,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UrlScanRequest {
    pub url: String,
    pub user_id: String,
}

fn required_user_id(user_id: Option<String>) -> Result<String, ApiError> {
    user_id
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::BadRequest("user_id is required".into()))
}

/// `POST /predict`: multipart `user_id`, optional `text`, `file`.
pub async fn scan_upload(
    State(ctx): State<ApiContext>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let mut multipart = multipart.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let mut user_id: Option<String> = None;
    let mut text: Option<String> = None;
    let mut file: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed form data: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "user_id" => {
                user_id = Some(field.text().await.map_err(|e| {
                    ApiError::BadRequest(format!("Unreadable user_id: {e}"))
                })?);
            }
            "text" => {
                text = Some(field.text().await.map_err(|e| {
                    ApiError::BadRequest(format!("Unreadable text: {e}"))
                })?);
            }
            "file" => {
                let bytes = field.bytes().await.map_err(|e| {
                    tracing::warn!("Failed to read upload bytes: {e}");
                    ApiError::BadRequest("Failed to read file data".into())
                })?;
                file = Some(bytes.to_vec());
            }
            _ => {}
        }
    }

    let user_id = required_user_id(user_id)?;
    let image = file.ok_or_else(|| ApiError::BadRequest("file is required".into()))?;
    let request = ScanRequest::from_upload(text, image);

    let outcome = ctx.orchestrator.run(request, &user_id).await?;
    Ok(Json(outcome.into()))
}

/// `POST /predict/url`: JSON `{url, user_id}`.
pub async fn scan_url(
    State(ctx): State<ApiContext>,
    payload: Result<Json<UrlScanRequest>, JsonRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let Json(payload) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let user_id = required_user_id(Some(payload.user_id))?;
    let url = payload.url.trim().to_string();
    if url.is_empty() {
        return Err(ApiError::BadRequest("url is required".into()));
    }

    let outcome = ctx.orchestrator.run(ScanRequest::Url { url }, &user_id).await?;
    Ok(Json(outcome.into()))
}
