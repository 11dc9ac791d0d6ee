//! Multimodal real/fake classifier capability.
//!
//! The model itself (BERT text branch + ResNet image branch) is trained
//! elsewhere and exported to ONNX. This module only loads and runs it.

use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;

use super::types::ClassificationResult;

/// Token sequence length the model was exported with.
pub const MAX_TOKENS: usize = 128;
/// Square input resolution of the image branch.
pub const IMAGE_SIZE: u32 = 224;
/// ImageNet channel statistics used at training time.
pub const IMAGE_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGE_STD: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("Classifier model is not loaded")]
    ModelUnavailable,

    #[error("Model file not found: {0}")]
    ModelNotFound(std::path::PathBuf),

    #[error("Model initialization failed: {0}")]
    ModelInit(String),

    #[error("Inference failed: {0}")]
    Inference(String),
}

/// Text + image → probability of the "fake" class.
///
/// Implementations must be safe to call from several blocking-pool threads
/// at once (serialize internally if the runtime session is not).
pub trait Classifier: Send + Sync {
    fn fake_probability(&self, text: &str, image_bytes: &[u8]) -> Result<f64, ClassifierError>;

    /// Classify and apply the verdict rule.
    fn predict(
        &self,
        text: &str,
        image_bytes: &[u8],
    ) -> Result<ClassificationResult, ClassifierError> {
        let p = self.fake_probability(text, image_bytes)?;
        ClassificationResult::from_fake_probability(p)
    }
}

/// Two-class softmax, returning the probability of class 1.
pub fn softmax_class1(logits: &[f32]) -> Result<f64, ClassifierError> {
    if logits.len() != 2 {
        return Err(ClassifierError::Inference(format!(
            "expected 2 logits, got {}",
            logits.len()
        )));
    }
    let a = logits[0] as f64;
    let b = logits[1] as f64;
    let max = a.max(b);
    let ea = (a - max).exp();
    let eb = (b - max).exp();
    Ok(eb / (ea + eb))
}

/// Pad or truncate token ids to exactly `len`, returning (ids, attention mask).
///
/// Truncation keeps the final token so the `[SEP]` marker survives.
pub fn fit_tokens(ids: &[u32], len: usize) -> (Vec<i64>, Vec<i64>) {
    let mut fitted: Vec<i64> = if ids.len() > len && len > 0 {
        let mut head: Vec<i64> = ids[..len - 1].iter().map(|&id| id as i64).collect();
        head.push(ids[ids.len() - 1] as i64);
        head
    } else {
        ids.iter().map(|&id| id as i64).collect()
    };
    let mut mask = vec![1i64; fitted.len()];
    fitted.resize(len, 0);
    mask.resize(len, 0);
    (fitted, mask)
}

// ═══════════════════════════════════════════════════════════
// ONNX classifier (`onnx` feature)
// ═══════════════════════════════════════════════════════════

#[cfg(feature = "onnx")]
mod onnx {
    use super::{
        fit_tokens, softmax_class1, Classifier, ClassifierError, IMAGE_MEAN, IMAGE_SIZE,
        IMAGE_STD, MAX_TOKENS,
    };
    use image::imageops::FilterType;
    use ort::session::Session;
    use std::path::Path;
    use std::sync::Mutex;

    /// Multimodal classifier running on ONNX Runtime.
    ///
    /// Requires two files in the model directory:
    /// - `model.onnx`: inputs `input_ids`, `attention_mask`, `image`; output logits `[1, 2]`
    /// - `tokenizer.json`: HuggingFace tokenizer (bert-base-uncased)
    ///
    /// `Session::run` requires `&mut self`, so the session sits behind a Mutex
    /// and concurrent scans are serialized at inference.
    pub struct OnnxClassifier {
        session: Mutex<Session>,
        tokenizer: tokenizers::Tokenizer,
    }

    impl OnnxClassifier {
        pub fn load(model_dir: &Path) -> Result<Self, ClassifierError> {
            let model_path = model_dir.join("model.onnx");
            let tokenizer_path = model_dir.join("tokenizer.json");

            if !model_path.exists() {
                return Err(ClassifierError::ModelNotFound(model_path));
            }
            if !tokenizer_path.exists() {
                return Err(ClassifierError::ModelNotFound(tokenizer_path));
            }

            let session = Session::builder()
                .map_err(|e: ort::Error| ClassifierError::ModelInit(e.to_string()))?
                .with_intra_threads(2)
                .map_err(|e: ort::Error| ClassifierError::ModelInit(e.to_string()))?
                .commit_from_file(&model_path)
                .map_err(|e: ort::Error| {
                    ClassifierError::ModelInit(format!("ONNX load failed: {e}"))
                })?;

            let tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path)
                .map_err(|e| ClassifierError::ModelInit(format!("Tokenizer load failed: {e}")))?;

            tracing::info!("ONNX classifier loaded from {}", model_dir.display());

            Ok(Self {
                session: Mutex::new(session),
                tokenizer,
            })
        }

        fn image_tensor(image_bytes: &[u8]) -> Result<ndarray::Array4<f32>, ClassifierError> {
            let img = image::load_from_memory(image_bytes)
                .map_err(|e| ClassifierError::Inference(format!("Image decode failed: {e}")))?;
            let rgb = img.to_rgb8();
            let resized =
                image::imageops::resize(&rgb, IMAGE_SIZE, IMAGE_SIZE, FilterType::Triangle);

            let side = IMAGE_SIZE as usize;
            let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, side, side));
            for (x, y, pixel) in resized.enumerate_pixels() {
                for c in 0..3 {
                    let value = pixel[c] as f32 / 255.0;
                    tensor[[0, c, y as usize, x as usize]] = (value - IMAGE_MEAN[c]) / IMAGE_STD[c];
                }
            }
            Ok(tensor)
        }
    }

    impl Classifier for OnnxClassifier {
        fn fake_probability(
            &self,
            text: &str,
            image_bytes: &[u8],
        ) -> Result<f64, ClassifierError> {
            use ort::value::TensorRef;

            let encoding = self
                .tokenizer
                .encode(text, true)
                .map_err(|e| ClassifierError::Inference(format!("Tokenization: {e}")))?;
            let (input_ids, attention_mask) = fit_tokens(encoding.get_ids(), MAX_TOKENS);

            let ids_array = ndarray::Array2::from_shape_vec((1, MAX_TOKENS), input_ids)
                .map_err(|e| ClassifierError::Inference(e.to_string()))?;
            let mask_array = ndarray::Array2::from_shape_vec((1, MAX_TOKENS), attention_mask)
                .map_err(|e| ClassifierError::Inference(e.to_string()))?;
            let image_array = Self::image_tensor(image_bytes)?;

            let ids_tensor = TensorRef::from_array_view(&ids_array)
                .map_err(|e| ClassifierError::Inference(e.to_string()))?;
            let mask_tensor = TensorRef::from_array_view(&mask_array)
                .map_err(|e| ClassifierError::Inference(e.to_string()))?;
            let image_tensor = TensorRef::from_array_view(&image_array)
                .map_err(|e| ClassifierError::Inference(e.to_string()))?;

            let mut session = self
                .session
                .lock()
                .map_err(|_| ClassifierError::Inference("Session lock poisoned".to_string()))?;

            let outputs = session
                .run(ort::inputs![ids_tensor, mask_tensor, image_tensor])
                .map_err(|e| ClassifierError::Inference(format!("ONNX inference failed: {e}")))?;

            let (shape, logits) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| ClassifierError::Inference(format!("Output extraction: {e}")))?;

            if shape.len() != 2 || shape[1] != 2 {
                return Err(ClassifierError::Inference(format!(
                    "Unexpected output shape: {shape:?}, expected [1, 2]"
                )));
            }

            softmax_class1(&logits[..2])
        }
    }
}

#[cfg(feature = "onnx")]
pub use onnx::OnnxClassifier;

/// Mock classifier for testing: returns a fixed fake probability.
pub struct MockClassifier {
    probability: f64,
    fail_with: Option<String>,
    calls: AtomicUsize,
}

impl MockClassifier {
    pub fn new(probability: f64) -> Self {
        Self {
            probability,
            fail_with: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// A classifier whose every call fails with an inference error.
    pub fn failing(reason: &str) -> Self {
        Self {
            probability: 0.0,
            fail_with: Some(reason.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of times the classifier was invoked.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Classifier for MockClassifier {
    fn fake_probability(&self, _text: &str, _image_bytes: &[u8]) -> Result<f64, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.fail_with {
            Some(reason) => Err(ClassifierError::Inference(reason.clone())),
            None => Ok(self.probability),
        }
    }
}
