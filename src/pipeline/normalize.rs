//! Input normalization: every `ScanRequest` mode resolves to a
//! `NormalizedInput` or a typed `ScanError`. Nothing reaches the
//! classifier with blank text or a missing image.

use std::sync::Arc;

use super::ocr::OcrEngine;
use super::scraper::ArticleScraper;
use super::types::{NormalizedInput, Provenance, ScanError, ScanRequest};

pub struct InputNormalizer {
    ocr: Arc<dyn OcrEngine>,
    scraper: Arc<dyn ArticleScraper>,
}

impl InputNormalizer {
    pub fn new(ocr: Arc<dyn OcrEngine>, scraper: Arc<dyn ArticleScraper>) -> Self {
        Self { ocr, scraper }
    }

    pub async fn normalize(&self, request: ScanRequest) -> Result<NormalizedInput, ScanError> {
        match request {
            ScanRequest::Direct { text, image } if !text.trim().is_empty() => {
                ensure_decodable(&image)?;
                NormalizedInput::new(text, image, Provenance::Direct)
            }
            ScanRequest::Direct { image, .. } | ScanRequest::ImageOnly { image } => {
                self.from_image(image).await
            }
            ScanRequest::Url { url } => self.from_url(&url).await,
        }
    }

    async fn from_image(&self, image: Vec<u8>) -> Result<NormalizedInput, ScanError> {
        ensure_decodable(&image)?;

        let text = self.ocr.extract_text(&image).await.map_err(|e| {
            tracing::warn!(error = %e, "OCR failed");
            ScanError::UpstreamUnavailable("ocr".into())
        })?;

        tracing::debug!(chars = text.chars().count(), "OCR text extracted");
        NormalizedInput::new(text, image, Provenance::Ocr)
    }

    async fn from_url(&self, url: &str) -> Result<NormalizedInput, ScanError> {
        let article = self.scraper.scrape(url).await.map_err(|e| {
            tracing::warn!(error = %e, url, "Scrape failed");
            ScanError::UpstreamUnavailable("scrape".into())
        })?;

        if article.headline.trim().is_empty() || article.image.is_empty() {
            tracing::warn!(url, "Scrape returned an incomplete article");
            return Err(ScanError::UpstreamUnavailable("scrape".into()));
        }
        if image::guess_format(&article.image).is_err() {
            tracing::warn!(
                url,
                image_url = %article.image_url,
                "Scraped image is not a known format"
            );
            return Err(ScanError::UpstreamUnavailable("scrape".into()));
        }

        NormalizedInput::new(article.headline, article.image, Provenance::UrlScrape)
    }
}

/// Reject empty uploads and bytes that are not a recognisable image.
fn ensure_decodable(image: &[u8]) -> Result<(), ScanError> {
    if image.is_empty() {
        return Err(ScanError::BadInput("image is empty".into()));
    }
    image::guess_format(image)
        .map(|_| ())
        .map_err(|_| ScanError::BadInput("image is unreadable".into()))
}
