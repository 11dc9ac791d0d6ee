//! Scan orchestration: normalize → classify → explain → record.
//!
//! Only the first three stages can fail a scan. Explanation degrades and
//! recording swallows its errors, so once classification succeeds the
//! scan always completes.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use tracing::Instrument;
use uuid::Uuid;

use crate::core_state::CapabilityRegistry;

use super::classifier::ClassifierError;
use super::explain::ExplanationGenerator;
use super::normalize::InputNormalizer;
use super::recorder::{display_text, ScanRecorder};
use super::types::{ScanError, ScanOutcome, ScanRecord, ScanRequest};

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineStage {
    Received,
    Normalizing,
    Classifying,
    Explaining,
    Recording,
    Complete,
    Failed(ScanError),
}

/// Result of the work done in the current stage.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    Succeeded,
    Failed(ScanError),
}

impl PipelineStage {
    /// Transition table. `Explaining` and `Recording` ignore failures and
    /// always move on; terminal stages never move.
    pub fn advance(self, outcome: StageOutcome) -> PipelineStage {
        use PipelineStage::*;
        match (self, outcome) {
            (Received, StageOutcome::Succeeded) => Normalizing,
            (Normalizing, StageOutcome::Succeeded) => Classifying,
            (Classifying, StageOutcome::Succeeded) => Explaining,
            (Received | Normalizing | Classifying, StageOutcome::Failed(reason)) => Failed(reason),
            (Explaining, _) => Recording,
            (Recording, _) => Complete,
            (terminal @ (Complete | Failed(_)), _) => terminal,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStage::Complete | PipelineStage::Failed(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            PipelineStage::Received => "received",
            PipelineStage::Normalizing => "normalizing",
            PipelineStage::Classifying => "classifying",
            PipelineStage::Explaining => "explaining",
            PipelineStage::Recording => "recording",
            PipelineStage::Complete => "complete",
            PipelineStage::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn advance(stage: PipelineStage, outcome: StageOutcome) -> PipelineStage {
    let from = stage.name();
    let next = stage.advance(outcome);
    tracing::debug!(from, to = next.name(), "Stage transition");
    next
}

/// Move `stage` into `Failed` and hand back the reason.
fn fail(stage: PipelineStage, reason: ScanError) -> ScanError {
    let from = stage.name();
    match stage.advance(StageOutcome::Failed(reason.clone())) {
        PipelineStage::Failed(reason) => {
            tracing::warn!(stage = from, error = %reason, "Scan failed");
            reason
        }
        other => {
            tracing::error!(
                stage = from,
                next = other.name(),
                "Failure raised from a non-failing stage"
            );
            reason
        }
    }
}

fn classifier_failure(e: ClassifierError) -> ScanError {
    match e {
        ClassifierError::ModelUnavailable => ScanError::ServiceUnavailable,
        other => ScanError::InferenceError(other.to_string()),
    }
}

pub struct ScanOrchestrator {
    registry: Arc<CapabilityRegistry>,
    normalizer: InputNormalizer,
    explainer: ExplanationGenerator,
    recorder: ScanRecorder,
}

impl ScanOrchestrator {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        normalizer: InputNormalizer,
        explainer: ExplanationGenerator,
        recorder: ScanRecorder,
    ) -> Self {
        Self {
            registry,
            normalizer,
            explainer,
            recorder,
        }
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn recorder(&self) -> &ScanRecorder {
        &self.recorder
    }

    /// Run one scan to completion or to its first user-visible failure.
    pub async fn run(&self, request: ScanRequest, user_id: &str) -> Result<ScanOutcome, ScanError> {
        let scan_id = Uuid::new_v4();
        let span = tracing::info_span!("scan", %scan_id, mode = request.mode());
        self.run_stages(scan_id, request, user_id)
            .instrument(span)
            .await
    }

    async fn run_stages(
        &self,
        scan_id: Uuid,
        request: ScanRequest,
        user_id: &str,
    ) -> Result<ScanOutcome, ScanError> {
        let stage = PipelineStage::Received;

        // Checked before any OCR or scraping work is spent
        let Some(classifier) = self.registry.classifier() else {
            return Err(fail(stage, ScanError::ServiceUnavailable));
        };
        let stage = advance(stage, StageOutcome::Succeeded);

        let input = match self.normalizer.normalize(request).await {
            Ok(input) => input,
            Err(reason) => return Err(fail(stage, reason)),
        };
        let stage = advance(stage, StageOutcome::Succeeded);

        let inference = tokio::task::spawn_blocking(move || {
            let result = classifier.predict(input.subject_text(), input.image_bytes());
            (input, result)
        })
        .await;
        let (input, verdict) = match inference {
            Ok((input, Ok(verdict))) => (input, verdict),
            Ok((_, Err(e))) => return Err(fail(stage, classifier_failure(e))),
            Err(join) => {
                return Err(fail(
                    stage,
                    ScanError::InferenceError(format!("inference task failed: {join}")),
                ))
            }
        };
        tracing::info!(label = %verdict.label, confidence = verdict.confidence, "Classified");
        let stage = advance(stage, StageOutcome::Succeeded);

        let explanation = self
            .explainer
            .explain(input.subject_text(), verdict.label, verdict.confidence)
            .await;
        let stage = advance(stage, StageOutcome::Succeeded);

        let record = ScanRecord {
            id: scan_id,
            user_id: user_id.to_string(),
            display_text: display_text(input.subject_text(), input.provenance()),
            label: verdict.label,
            confidence: verdict.confidence,
            explanation: explanation.text.clone(),
            created_at: Utc::now(),
        };
        if let Err(e) = self.recorder.record(record).await {
            tracing::warn!(error = %e, "Scan record not persisted");
        }
        let stage = advance(stage, StageOutcome::Succeeded);
        debug_assert_eq!(stage, PipelineStage::Complete);

        Ok(ScanOutcome {
            scan_id,
            label: verdict.label,
            confidence: verdict.confidence,
            fake_probability: verdict.fake_probability,
            explanation: explanation.text,
            explanation_degraded: explanation.degraded,
            subject_text: input.subject_text().to_string(),
            provenance: input.provenance(),
        })
    }
}
