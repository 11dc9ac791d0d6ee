//! Training metadata written next to the model by the training job.

use std::path::Path;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::types::ApiContext;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelStats {
    #[serde(default)]
    pub accuracy: f64,
    #[serde(default = "never")]
    pub last_trained: String,
    #[serde(default)]
    pub total_samples: u64,
    #[serde(default = "untrained")]
    pub model_version: String,
    #[serde(default = "default_architecture")]
    pub architecture: String,
}

fn never() -> String {
    "Never".to_string()
}

fn untrained() -> String {
    "untrained".to_string()
}

fn default_architecture() -> String {
    "Multimodal (Image + Text)".to_string()
}

impl ModelStats {
    /// Payload served when no training run has been recorded.
    pub fn untrained() -> Self {
        Self {
            accuracy: 0.0,
            last_trained: never(),
            total_samples: 0,
            model_version: untrained(),
            architecture: default_architecture(),
        }
    }
}

/// Read the stats file; missing or unparsable files yield `untrained()`.
pub async fn load_model_stats(path: &Path) -> ModelStats {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "No model stats file");
            return ModelStats::untrained();
        }
    };
    serde_json::from_slice(&raw).unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), error = %e, "Unreadable model stats file");
        ModelStats::untrained()
    })
}

/// `GET /stats`
pub async fn model_stats(State(ctx): State<ApiContext>) -> Json<ModelStats> {
    Json(load_model_stats(&ctx.stats_path).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_is_untrained() {
        let tmp = tempfile::tempdir().unwrap();
        let stats = load_model_stats(&tmp.path().join("model_stats.json")).await;
        assert_eq!(stats, ModelStats::untrained());
    }

    #[tokio::test]
    async fn reads_training_output() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("model_stats.json");
        std::fs::write(
            &path,
            r#"{
                "accuracy": 91.37,
                "last_trained": "2026-03-02 14:05:11",
                "total_samples": 12840,
                "model_version": "ResNet50 + BERT (v1.1)",
                "architecture": "Multimodal (Image + Text)"
            }"#,
        )
        .unwrap();
        let stats = load_model_stats(&path).await;
        assert_eq!(stats.accuracy, 91.37);
        assert_eq!(stats.total_samples, 12840);
        assert_eq!(stats.model_version, "ResNet50 + BERT (v1.1)");
    }

    #[tokio::test]
    async fn partial_file_fills_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("model_stats.json");
        std::fs::write(&path, r#"{"accuracy": 88.0}"#).unwrap();
        let stats = load_model_stats(&path).await;
        assert_eq!(stats.accuracy, 88.0);
        assert_eq!(stats.last_trained, "Never");
    }

    #[tokio::test]
    async fn garbage_file_is_untrained() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("model_stats.json");
        std::fs::write(&path, "not json").unwrap();
        assert_eq!(load_model_stats(&path).await, ModelStats::untrained());
    }
}
