use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, HISTORY_LIMIT};
use crate::pipeline::types::{Label, ScanRecord};

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    pub id: String,
    pub user_id: String,
    pub text: String,
    pub label: Label,
    pub confidence: f64,
    pub summary: String,
    pub created_at: DateTime<Utc>,
}

impl From<ScanRecord> for HistoryEntry {
    fn from(record: ScanRecord) -> Self {
        Self {
            id: record.id.to_string(),
            user_id: record.user_id,
            text: record.display_text,
            label: record.label,
            confidence: record.confidence,
            summary: record.explanation,
            created_at: record.created_at,
        }
    }
}

/// `GET /history?user_id=`: the user's most recent scans, newest first.
pub async fn recent(
    State(ctx): State<ApiContext>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    let user_id = query
        .user_id
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("user_id is required".into()))?;

    let records = ctx
        .orchestrator
        .recorder()
        .history(&user_id, HISTORY_LIMIT)
        .await
        .map_err(|e| ApiError::Internal(format!("history query: {e}")))?;

    Ok(Json(records.into_iter().map(HistoryEntry::from).collect()))
}
