//! Best-effort audit trail of completed scans.

use std::sync::Arc;

use crate::db::DatabaseError;

use super::types::{Provenance, ScanRecord};

/// Display text is cut to this many characters before the ellipsis.
pub const DISPLAY_TEXT_CHARS: usize = 200;

/// Persistence for scan records. Implementations are synchronous; callers
/// on the async runtime go through [`ScanRecorder`].
pub trait ScanStore: Send + Sync {
    fn insert(&self, record: &ScanRecord) -> Result<(), DatabaseError>;

    /// Most recent records for a user, newest first.
    fn recent_for_user(&self, user_id: &str, limit: usize)
        -> Result<Vec<ScanRecord>, DatabaseError>;
}

/// Provenance-tagged, truncated text stored in the audit trail.
pub fn display_text(subject_text: &str, provenance: Provenance) -> String {
    let mut shown: String = subject_text.chars().take(DISPLAY_TEXT_CHARS).collect();
    if subject_text.chars().count() > DISPLAY_TEXT_CHARS {
        shown.push_str("...");
    }
    format!("{}{}", provenance.display_tag(), shown)
}

#[derive(Clone)]
pub struct ScanRecorder {
    store: Arc<dyn ScanStore>,
}

impl ScanRecorder {
    pub fn new(store: Arc<dyn ScanStore>) -> Self {
        Self { store }
    }

    /// Write one record on the blocking pool. The caller decides what a
    /// failure means; the pipeline only logs it.
    pub async fn record(&self, record: ScanRecord) -> Result<(), DatabaseError> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.insert(&record))
            .await
            .map_err(|e| DatabaseError::Task(format!("insert: {e}")))?
    }

    pub async fn history(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ScanRecord>, DatabaseError> {
        let store = self.store.clone();
        let user_id = user_id.to_string();
        tokio::task::spawn_blocking(move || store.recent_for_user(&user_id, limit))
            .await
            .map_err(|e| DatabaseError::Task(format!("history query: {e}")))?
    }
}

/// Store whose every call fails. Used to prove persistence errors stay
/// invisible to callers.
#[cfg(test)]
pub(crate) struct FailingStore;

#[cfg(test)]
impl ScanStore for FailingStore {
    fn insert(&self, _record: &ScanRecord) -> Result<(), DatabaseError> {
        Err(DatabaseError::ConstraintViolation("disk full".into()))
    }

    fn recent_for_user(
        &self,
        _user_id: &str,
        _limit: usize,
    ) -> Result<Vec<ScanRecord>, DatabaseError> {
        Err(DatabaseError::ConstraintViolation("disk full".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteScanStore;
    use crate::pipeline::types::Label;
    use chrono::Utc;
    use uuid::Uuid;

    fn record(user: &str, text: &str) -> ScanRecord {
        ScanRecord {
            id: Uuid::new_v4(),
            user_id: user.into(),
            display_text: text.into(),
            label: Label::Real,
            confidence: 90.0,
            explanation: "Neutral tone.".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn short_direct_text_is_unchanged() {
        assert_eq!(display_text("Mayor resigns", Provenance::Direct), "Mayor resigns");
    }

    #[test]
    fn provenance_prefix_applied() {
        assert_eq!(display_text("Headline", Provenance::Ocr), "[OCR] Headline");
        assert_eq!(display_text("Headline", Provenance::UrlScrape), "[URL] Headline");
    }

    #[test]
    fn long_text_truncated_with_ellipsis() {
        let long = "a".repeat(250);
        let shown = display_text(&long, Provenance::Ocr);
        assert_eq!(shown, format!("[OCR] {}...", "a".repeat(DISPLAY_TEXT_CHARS)));
    }

    #[test]
    fn exactly_limit_is_not_truncated() {
        let text = "b".repeat(DISPLAY_TEXT_CHARS);
        assert_eq!(display_text(&text, Provenance::Direct), text);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = "é".repeat(DISPLAY_TEXT_CHARS + 5);
        let shown = display_text(&text, Provenance::Direct);
        assert_eq!(shown.chars().count(), DISPLAY_TEXT_CHARS + 3);
    }

    #[tokio::test]
    async fn record_then_history() {
        let store = Arc::new(SqliteScanStore::open_in_memory().unwrap());
        let recorder = ScanRecorder::new(store);
        recorder.record(record("u1", "first")).await.unwrap();
        let history = recorder.history("u1", 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].display_text, "first");
    }

    struct PanickingStore;

    impl ScanStore for PanickingStore {
        fn insert(&self, _record: &ScanRecord) -> Result<(), DatabaseError> {
            panic!("store crashed")
        }

        fn recent_for_user(
            &self,
            _user_id: &str,
            _limit: usize,
        ) -> Result<Vec<ScanRecord>, DatabaseError> {
            panic!("store crashed")
        }
    }

    #[tokio::test]
    async fn crashed_store_task_is_a_task_error() {
        let recorder = ScanRecorder::new(Arc::new(PanickingStore));
        let err = recorder.record(record("u1", "x")).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Task(ref msg) if msg.starts_with("insert")));
        let err = recorder.history("u1", 10).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Task(ref msg) if msg.starts_with("history query")));
    }

    #[tokio::test]
    async fn failing_store_surfaces_error_to_caller() {
        let recorder = ScanRecorder::new(Arc::new(FailingStore));
        assert!(recorder.record(record("u1", "x")).await.is_err());
    }
}
