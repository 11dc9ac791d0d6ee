//! Process-wide capability registry.
//!
//! Built once at startup, shared through `Arc` with every request task and
//! torn down after the server stops. Requests only ever read the slot; the
//! write lock is taken at install and teardown.

use std::sync::{Arc, RwLock};

use crate::pipeline::classifier::Classifier;

pub struct CapabilityRegistry {
    classifier: RwLock<Option<Arc<dyn Classifier>>>,
}

impl CapabilityRegistry {
    /// Empty registry: the classifier reports not-ready.
    pub fn new() -> Self {
        Self {
            classifier: RwLock::new(None),
        }
    }

    pub fn with_classifier(classifier: Arc<dyn Classifier>) -> Self {
        Self {
            classifier: RwLock::new(Some(classifier)),
        }
    }

    /// Install (or replace) the classifier.
    pub fn install(&self, classifier: Arc<dyn Classifier>) {
        match self.classifier.write() {
            Ok(mut slot) => *slot = Some(classifier),
            Err(poisoned) => *poisoned.into_inner() = Some(classifier),
        }
        tracing::info!("Classifier installed");
    }

    /// The loaded classifier, if any.
    pub fn classifier(&self) -> Option<Arc<dyn Classifier>> {
        match self.classifier.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.classifier().is_some()
    }

    /// Remove the classifier. The underlying session is released once the
    /// last in-flight request drops its handle. Returns whether one was loaded.
    pub fn teardown(&self) -> bool {
        let previous = match self.classifier.write() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let was_loaded = previous.is_some();
        if was_loaded {
            tracing::info!("Classifier released");
        }
        was_loaded
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Load every startup capability into a fresh registry.
///
/// A classifier that fails to load is logged and left out: the service still
/// starts and answers `/predict` with 503 until a model is available.
pub fn load_capabilities(model_dir: &std::path::Path) -> CapabilityRegistry {
    let registry = CapabilityRegistry::new();

    #[cfg(feature = "onnx")]
    match crate::pipeline::classifier::OnnxClassifier::load(model_dir) {
        Ok(classifier) => registry.install(Arc::new(classifier)),
        Err(e) => tracing::warn!(
            error = %e,
            model_dir = %model_dir.display(),
            "Classifier not loaded; predictions will return 503"
        ),
    }

    #[cfg(not(feature = "onnx"))]
    tracing::warn!(
        model_dir = %model_dir.display(),
        "Built without the `onnx` feature; predictions will return 503"
    );

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::classifier::MockClassifier;

    #[test]
    fn new_registry_is_not_ready() {
        let registry = CapabilityRegistry::new();
        assert!(!registry.is_ready());
        assert!(registry.classifier().is_none());
    }

    #[test]
    fn install_makes_registry_ready() {
        let registry = CapabilityRegistry::new();
        registry.install(Arc::new(MockClassifier::new(0.2)));
        assert!(registry.is_ready());
    }

    #[test]
    fn teardown_releases_classifier() {
        let registry = CapabilityRegistry::with_classifier(Arc::new(MockClassifier::new(0.2)));
        assert!(registry.teardown());
        assert!(!registry.is_ready());
        assert!(!registry.teardown());
    }

    #[test]
    fn handles_outlive_teardown() {
        let registry = CapabilityRegistry::with_classifier(Arc::new(MockClassifier::new(0.9)));
        let handle = registry.classifier().unwrap();
        registry.teardown();
        // An in-flight request keeps working with its own handle
        assert!(handle.predict("text", b"img").is_ok());
    }

    #[test]
    fn load_from_missing_dir_leaves_registry_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = load_capabilities(&tmp.path().join("no-model"));
        assert!(!registry.is_ready());
    }
}
