//! OCR capability: reads the headline/claim text off an uploaded image.
//!
//! Production engine is a vision model served by Ollama. The model receives
//! the image as base64 through `/api/chat` and answers with the visible text.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use base64::Engine as _;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("OCR engine is not reachable at {0}")]
    Connection(String),

    #[error("OCR request timed out after {0}s")]
    Timeout(u64),

    #[error("OCR engine returned error (status {status}): {body}")]
    Engine { status: u16, body: String },

    #[error("OCR processing failed: {0}")]
    Processing(String),
}

pub trait OcrEngine: Send + Sync {
    /// Extract the visible text from an image. Empty output is not an error.
    fn extract_text<'a>(&'a self, image_bytes: &'a [u8]) -> BoxFuture<'a, Result<String, OcrError>>;
}

const OCR_SYSTEM_PROMPT: &str = "\
You are a text extractor. Reproduce the text that is visible in the image exactly, \
without commentary. If the image contains no readable text, reply with nothing.";

const OCR_USER_PROMPT: &str = "\
Extract all visible text from this image, headline first. Output plain text only.";

// ──────────────────────────────────────────────
// OllamaVisionOcr
// ──────────────────────────────────────────────

/// Production vision OCR engine backed by Ollama.
pub struct OllamaVisionOcr {
    base_url: String,
    model: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl OllamaVisionOcr {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self, OcrError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OcrError::Processing(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
            timeout,
        })
    }
}

#[derive(Serialize)]
struct VisionChatRequest<'a> {
    model: &'a str,
    messages: Vec<VisionChatMessage<'a>>,
    stream: bool,
    options: VisionOptions,
}

#[derive(Serialize)]
struct VisionChatMessage<'a> {
    role: &'a str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<Vec<String>>,
}

/// Deterministic extraction.
#[derive(Serialize)]
struct VisionOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct VisionChatResponse {
    message: VisionResponseMessage,
}

#[derive(Deserialize)]
struct VisionResponseMessage {
    content: String,
}

impl OcrEngine for OllamaVisionOcr {
    fn extract_text<'a>(
        &'a self,
        image_bytes: &'a [u8],
    ) -> BoxFuture<'a, Result<String, OcrError>> {
        Box::pin(async move {
            let start = std::time::Instant::now();
            let base64_image = base64::engine::general_purpose::STANDARD.encode(image_bytes);

            let body = VisionChatRequest {
                model: &self.model,
                messages: vec![
                    VisionChatMessage {
                        role: "system",
                        content: OCR_SYSTEM_PROMPT,
                        images: None,
                    },
                    VisionChatMessage {
                        role: "user",
                        content: OCR_USER_PROMPT,
                        images: Some(vec![base64_image]),
                    },
                ],
                stream: false,
                options: VisionOptions { temperature: 0.0 },
            };

            let response = self
                .client
                .post(format!("{}/api/chat", self.base_url))
                .json(&body)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        OcrError::Timeout(self.timeout.as_secs())
                    } else if e.is_connect() {
                        OcrError::Connection(self.base_url.clone())
                    } else {
                        OcrError::Processing(e.to_string())
                    }
                })?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(OcrError::Engine {
                    status: status.as_u16(),
                    body,
                });
            }

            let parsed: VisionChatResponse = response
                .json()
                .await
                .map_err(|e| OcrError::Processing(format!("Malformed OCR response: {e}")))?;

            tracing::info!(
                model = %self.model,
                elapsed_ms = %start.elapsed().as_millis(),
                image_size = image_bytes.len(),
                text_len = parsed.message.content.len(),
                "Vision OCR extraction complete"
            );

            Ok(parsed.message.content)
        })
    }
}

/// Mock OCR engine for unit testing without a vision model.
pub struct MockOcrEngine {
    result: Result<String, String>,
    calls: AtomicUsize,
}

impl MockOcrEngine {
    pub fn new(text: &str) -> Self {
        Self {
            result: Ok(text.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            result: Err(reason.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl OcrEngine for MockOcrEngine {
    fn extract_text<'a>(
        &'a self,
        _image_bytes: &'a [u8],
    ) -> BoxFuture<'a, Result<String, OcrError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = self.result.clone().map_err(OcrError::Processing);
        Box::pin(async move { result })
    }
}
