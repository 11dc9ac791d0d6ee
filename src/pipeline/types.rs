use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::classifier::ClassifierError;

/// Incoming scan request. Exactly one input mode per request.
#[derive(Debug, Clone)]
pub enum ScanRequest {
    /// Caller supplied both the claim text and an accompanying image.
    Direct { text: String, image: Vec<u8> },
    /// Only an image; the text has to be read off it.
    ImageOnly { image: Vec<u8> },
    /// A remote article to scrape for headline + lead image.
    Url { url: String },
}

impl ScanRequest {
    /// Build a request from an upload form: blank text means image-only.
    pub fn from_upload(text: Option<String>, image: Vec<u8>) -> Self {
        match text {
            Some(text) if !text.trim().is_empty() => ScanRequest::Direct { text, image },
            _ => ScanRequest::ImageOnly { image },
        }
    }

    pub fn mode(&self) -> &'static str {
        match self {
            ScanRequest::Direct { .. } => "direct",
            ScanRequest::ImageOnly { .. } => "image_only",
            ScanRequest::Url { .. } => "url",
        }
    }
}

/// Which input-resolution path produced the subject text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Direct,
    Ocr,
    UrlScrape,
}

impl Provenance {
    /// Prefix used in the audit trail's display text.
    pub fn display_tag(&self) -> &'static str {
        match self {
            Provenance::Direct => "",
            Provenance::Ocr => "[OCR] ",
            Provenance::UrlScrape => "[URL] ",
        }
    }
}

/// Canonical (text, image) pair handed to the classifier.
///
/// Only constructed through [`NormalizedInput::new`], which rejects blank
/// text and empty image bytes. Caller-supplied text is kept verbatim; OCR
/// and scraped text is trimmed.
#[derive(Debug, Clone)]
pub struct NormalizedInput {
    subject_text: String,
    image_bytes: Vec<u8>,
    provenance: Provenance,
}

impl NormalizedInput {
    pub fn new(
        subject_text: String,
        image_bytes: Vec<u8>,
        provenance: Provenance,
    ) -> Result<Self, ScanError> {
        if subject_text.trim().is_empty() {
            return Err(ScanError::BadInput("no readable text".into()));
        }
        let subject_text = match provenance {
            Provenance::Direct => subject_text,
            Provenance::Ocr | Provenance::UrlScrape => subject_text.trim().to_string(),
        };
        if image_bytes.is_empty() {
            return Err(ScanError::BadInput("image is empty".into()));
        }
        Ok(Self {
            subject_text,
            image_bytes,
            provenance,
        })
    }

    pub fn subject_text(&self) -> &str {
        &self.subject_text
    }

    pub fn image_bytes(&self) -> &[u8] {
        &self.image_bytes
    }

    pub fn provenance(&self) -> Provenance {
        self.provenance
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Label {
    Real,
    Fake,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Real => "Real",
            Label::Fake => "Fake",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Label {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Real" => Ok(Label::Real),
            "Fake" => Ok(Label::Fake),
            other => Err(format!("unknown label: {other}")),
        }
    }
}

/// Classifier verdict.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub label: Label,
    /// Percentage of the winning class, two decimals.
    pub confidence: f64,
    /// Raw probability of the fake class as reported by the model.
    pub fake_probability: f64,
}

impl ClassificationResult {
    /// Apply the verdict rule: `Fake` iff `p > 0.5`, confidence is the
    /// winning class probability as a percentage rounded to 2 decimals.
    pub fn from_fake_probability(p: f64) -> Result<Self, ClassifierError> {
        if !p.is_finite() || !(0.0..=1.0).contains(&p) {
            return Err(ClassifierError::Inference(format!(
                "fake probability out of range: {p}"
            )));
        }
        let (label, winning) = if p > 0.5 {
            (Label::Fake, p)
        } else {
            (Label::Real, 1.0 - p)
        };
        Ok(Self {
            label,
            confidence: round2(winning * 100.0),
            fake_probability: p,
        })
    }
}

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Rationale attached to a verdict. `degraded` marks a static fallback.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Explanation {
    pub text: String,
    pub degraded: bool,
}

impl Explanation {
    pub fn generated(text: String) -> Self {
        Self {
            text,
            degraded: false,
        }
    }

    pub fn fallback(text: &str) -> Self {
        Self {
            text: text.to_string(),
            degraded: true,
        }
    }
}

/// Persisted audit entry. Written once per completed scan, never updated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanRecord {
    pub id: Uuid,
    pub user_id: String,
    pub display_text: String,
    pub label: Label,
    pub confidence: f64,
    pub explanation: String,
    pub created_at: DateTime<Utc>,
}

/// Final product of a completed scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanOutcome {
    pub scan_id: Uuid,
    pub label: Label,
    pub confidence: f64,
    pub fake_probability: f64,
    pub explanation: String,
    pub explanation_degraded: bool,
    pub subject_text: String,
    pub provenance: Provenance,
}

/// User-visible scan failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScanError {
    #[error("Bad input: {0}")]
    BadInput(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Classifier is not loaded")]
    ServiceUnavailable,

    #[error("Inference failed: {0}")]
    InferenceError(String),
}

impl ScanError {
    pub fn kind(&self) -> ScanErrorKind {
        match self {
            ScanError::BadInput(_) => ScanErrorKind::BadInput,
            ScanError::UpstreamUnavailable(_) => ScanErrorKind::UpstreamUnavailable,
            ScanError::ServiceUnavailable => ScanErrorKind::ServiceUnavailable,
            ScanError::InferenceError(_) => ScanErrorKind::InferenceError,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanErrorKind {
    BadInput,
    UpstreamUnavailable,
    ServiceUnavailable,
    InferenceError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_with_text_is_direct() {
        let req = ScanRequest::from_upload(Some("Headline".into()), vec![1]);
        assert!(matches!(req, ScanRequest::Direct { .. }));
    }

    #[test]
    fn upload_with_blank_or_missing_text_is_image_only() {
        assert!(matches!(
            ScanRequest::from_upload(Some("  \n".into()), vec![1]),
            ScanRequest::ImageOnly { .. }
        ));
        assert!(matches!(
            ScanRequest::from_upload(None, vec![1]),
            ScanRequest::ImageOnly { .. }
        ));
    }

    #[test]
    fn normalized_input_rejects_blank_text() {
        let err = NormalizedInput::new("   ".into(), vec![1], Provenance::Ocr).unwrap_err();
        assert_eq!(err, ScanError::BadInput("no readable text".into()));
    }

    #[test]
    fn normalized_input_rejects_empty_image() {
        let err = NormalizedInput::new("text".into(), vec![], Provenance::Direct).unwrap_err();
        assert_eq!(err.kind(), ScanErrorKind::BadInput);
    }

    #[test]
    fn normalized_input_trims_extracted_subject() {
        let input =
            NormalizedInput::new("  hi there \n".into(), vec![1], Provenance::Ocr).unwrap();
        assert_eq!(input.subject_text(), "hi there");
        let input =
            NormalizedInput::new(" Storm hits\n".into(), vec![1], Provenance::UrlScrape).unwrap();
        assert_eq!(input.subject_text(), "Storm hits");
    }

    #[test]
    fn normalized_input_keeps_direct_text_verbatim() {
        let input =
            NormalizedInput::new("  hi there \n".into(), vec![1], Provenance::Direct).unwrap();
        assert_eq!(input.subject_text(), "  hi there \n");
    }

    #[test]
    fn probability_083_is_fake_83() {
        let r = ClassificationResult::from_fake_probability(0.83).unwrap();
        assert_eq!(r.label, Label::Fake);
        assert_eq!(r.confidence, 83.0);
        assert_eq!(r.fake_probability, 0.83);
    }

    #[test]
    fn probability_010_is_real_90() {
        let r = ClassificationResult::from_fake_probability(0.10).unwrap();
        assert_eq!(r.label, Label::Real);
        assert_eq!(r.confidence, 90.0);
    }

    #[test]
    fn boundary_half_resolves_to_real() {
        let r = ClassificationResult::from_fake_probability(0.5).unwrap();
        assert_eq!(r.label, Label::Real);
        assert_eq!(r.confidence, 50.0);
    }

    #[test]
    fn confidence_always_in_upper_half() {
        for i in 0..=1000 {
            let p = i as f64 / 1000.0;
            let r = ClassificationResult::from_fake_probability(p).unwrap();
            assert!(r.confidence >= 50.0 && r.confidence <= 100.0, "p={p}");
            assert_eq!(r.label == Label::Fake, p > 0.5, "p={p}");
        }
    }

    #[test]
    fn confidence_rounds_to_two_decimals() {
        let r = ClassificationResult::from_fake_probability(0.876543).unwrap();
        assert_eq!(r.confidence, 87.65);
    }

    #[test]
    fn rounding_is_idempotent() {
        for raw in [50.0, 66.666_666, 83.004_9, 99.995, 87.654_321] {
            let once = round2(raw);
            assert_eq!(round2(once), once);
        }
    }

    #[test]
    fn out_of_range_probability_is_inference_error() {
        assert!(ClassificationResult::from_fake_probability(f64::NAN).is_err());
        assert!(ClassificationResult::from_fake_probability(1.2).is_err());
        assert!(ClassificationResult::from_fake_probability(-0.01).is_err());
    }

    #[test]
    fn label_round_trips_through_str() {
        assert_eq!("Fake".parse::<Label>().unwrap(), Label::Fake);
        assert_eq!(Label::Real.to_string(), "Real");
        assert!("fake".parse::<Label>().is_err());
    }

    #[test]
    fn provenance_tags() {
        assert_eq!(Provenance::Direct.display_tag(), "");
        assert_eq!(Provenance::Ocr.display_tag(), "[OCR] ");
        assert_eq!(Provenance::UrlScrape.display_tag(), "[URL] ");
    }
}
