//! Article scraping: page URL → (headline, lead image bytes).
//!
//! Headline: `og:title` → `<title>` → first `<h1>`.
//! Image: `og:image` → `twitter:image` → first plausible `<img>`.
//! Any failure along the way is a `ScrapeError`; callers treat every
//! variant the same ("no article").

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::LazyLock;
use std::time::Duration;

use futures_util::future::BoxFuture;
use regex::Regex;
use reqwest::Url;
use thiserror::Error;

/// Desktop browser UA; many news sites refuse unknown clients.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
(KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Article pages larger than this are abandoned mid-download.
const MAX_PAGE_BYTES: usize = 2 * 1024 * 1024;

/// `<img>` tags narrower than this are icons, spacers or tracking pixels.
const MIN_IMAGE_WIDTH: u32 = 50;

#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("No headline found")]
    MissingHeadline,

    #[error("No image found")]
    MissingImage,

    #[error("Page exceeds {limit} bytes")]
    PageTooLarge { limit: usize },

    #[error("Image exceeds {limit} bytes")]
    ImageTooLarge { limit: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScrapedArticle {
    pub headline: String,
    pub image: Vec<u8>,
    pub image_url: String,
}

pub trait ArticleScraper: Send + Sync {
    fn scrape<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<ScrapedArticle, ScrapeError>>;
}

// ──────────────────────────────────────────────
// HTML extraction
// ──────────────────────────────────────────────

static META_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<meta\b[^>]*>").unwrap());
static IMG_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<img\b[^>]*>").unwrap());
static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)([a-zA-Z_:][-a-zA-Z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .unwrap()
});
static TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title\b[^>]*>(.*?)</title>").unwrap());
static H1: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<h1\b[^>]*>(.*?)</h1>").unwrap());
static INNER_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]+>").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static NUMERIC_ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#(x[0-9a-fA-F]+|[0-9]+);").unwrap());

/// Parse the attributes of a single start tag. Keys are lowercased.
fn parse_attributes(tag: &str) -> HashMap<String, String> {
    ATTRIBUTE
        .captures_iter(tag)
        .filter_map(|caps| {
            let key = caps.get(1)?.as_str().to_ascii_lowercase();
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            Some((key, value))
        })
        .collect()
}

/// Content of the first `<meta>` whose `property` or `name` equals `key`.
fn meta_content(html: &str, key: &str) -> Option<String> {
    META_TAG.find_iter(html).find_map(|tag| {
        let attrs = parse_attributes(tag.as_str());
        let matches = ["property", "name"]
            .iter()
            .any(|attr| attrs.get(*attr).is_some_and(|v| v.eq_ignore_ascii_case(key)));
        if !matches {
            return None;
        }
        attrs
            .get("content")
            .map(|c| clean_text(c))
            .filter(|c| !c.is_empty())
    })
}

/// Decode the handful of entities that show up in titles.
fn decode_entities(text: &str) -> String {
    let numeric = NUMERIC_ENTITY.replace_all(text, |caps: &regex::Captures| {
        let raw = &caps[1];
        let code = match raw.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => raw.parse::<u32>().ok(),
        };
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default()
    });
    numeric
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// Strip markup, decode entities, collapse whitespace.
fn clean_text(raw: &str) -> String {
    let without_tags = INNER_TAG.replace_all(raw, " ");
    let decoded = decode_entities(&without_tags);
    WHITESPACE.replace_all(decoded.trim(), " ").into_owned()
}

pub fn find_headline(html: &str) -> Option<String> {
    meta_content(html, "og:title")
        .or_else(|| {
            TITLE
                .captures(html)
                .map(|c| clean_text(&c[1]))
                .filter(|t| !t.is_empty())
        })
        .or_else(|| {
            H1.captures(html)
                .map(|c| clean_text(&c[1]))
                .filter(|t| !t.is_empty())
        })
}

pub fn find_image_src(html: &str) -> Option<String> {
    meta_content(html, "og:image")
        .or_else(|| meta_content(html, "twitter:image"))
        .or_else(|| {
            IMG_TAG.find_iter(html).find_map(|tag| {
                let attrs = parse_attributes(tag.as_str());
                let src = attrs.get("src").map(|s| s.trim()).unwrap_or_default();
                if is_plausible_article_image(src, attrs.get("width").map(String::as_str)) {
                    Some(decode_entities(src))
                } else {
                    None
                }
            })
        })
}

fn is_plausible_article_image(src: &str, width: Option<&str>) -> bool {
    if src.is_empty() {
        return false;
    }
    let lower = src.to_ascii_lowercase();
    if lower.contains(".svg") || lower.contains("logo") || lower.contains("icon") {
        return false;
    }
    match width.and_then(|w| w.trim().parse::<u32>().ok()) {
        Some(w) if w < MIN_IMAGE_WIDTH => false,
        _ => true,
    }
}

/// Resolve protocol-relative and relative image URLs against the page.
pub fn resolve_image_url(page: &Url, src: &str) -> Result<Url, ScrapeError> {
    page.join(src)
        .map_err(|e| ScrapeError::InvalidUrl(format!("{src}: {e}")))
}

// ──────────────────────────────────────────────
// HttpArticleScraper
// ──────────────────────────────────────────────

pub struct HttpArticleScraper {
    client: reqwest::Client,
    timeout: Duration,
    max_image_bytes: usize,
}

impl HttpArticleScraper {
    pub fn new(timeout: Duration, max_image_bytes: usize) -> Result<Self, ScrapeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ScrapeError::Request(e.to_string()))?;
        Ok(Self {
            client,
            timeout,
            max_image_bytes,
        })
    }

    async fn fetch(&self, url: &Url) -> Result<reqwest::Response, ScrapeError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| self.timeout_or_request(e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    /// Read a body chunk by chunk, bailing out as soon as it grows past
    /// `limit`. A declared `Content-Length` over the limit fails before
    /// any byte is read.
    async fn read_capped(
        &self,
        mut response: reqwest::Response,
        limit: usize,
        too_large: fn(usize) -> ScrapeError,
    ) -> Result<Vec<u8>, ScrapeError> {
        if response.content_length().is_some_and(|len| len > limit as u64) {
            return Err(too_large(limit));
        }
        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.timeout_or_request(e))?
        {
            if body.len() + chunk.len() > limit {
                return Err(too_large(limit));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }

    fn timeout_or_request(&self, e: reqwest::Error) -> ScrapeError {
        if e.is_timeout() {
            ScrapeError::Timeout(self.timeout.as_secs())
        } else {
            ScrapeError::Request(e.to_string())
        }
    }

    async fn scrape_article(&self, raw_url: &str) -> Result<ScrapedArticle, ScrapeError> {
        let page_url = Url::parse(raw_url.trim())
            .map_err(|e| ScrapeError::InvalidUrl(format!("{raw_url}: {e}")))?;
        if !matches!(page_url.scheme(), "http" | "https") {
            return Err(ScrapeError::InvalidUrl(format!(
                "unsupported scheme: {}",
                page_url.scheme()
            )));
        }

        let page = self.fetch(&page_url).await?;
        let page = self
            .read_capped(page, MAX_PAGE_BYTES, |limit| {
                ScrapeError::PageTooLarge { limit }
            })
            .await?;
        let html = String::from_utf8_lossy(&page);

        let headline = find_headline(&html).ok_or(ScrapeError::MissingHeadline)?;
        let image_src = find_image_src(&html).ok_or(ScrapeError::MissingImage)?;
        let image_url = resolve_image_url(&page_url, &image_src)?;

        tracing::debug!(headline = %headline, image_url = %image_url, "Article metadata found");

        let response = self.fetch(&image_url).await?;
        let image = self
            .read_capped(response, self.max_image_bytes, |limit| {
                ScrapeError::ImageTooLarge { limit }
            })
            .await?;
        if image.is_empty() {
            return Err(ScrapeError::MissingImage);
        }

        Ok(ScrapedArticle {
            headline,
            image,
            image_url: image_url.to_string(),
        })
    }
}

impl ArticleScraper for HttpArticleScraper {
    fn scrape<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<ScrapedArticle, ScrapeError>> {
        Box::pin(self.scrape_article(url))
    }
}

/// Mock scraper for tests: returns a fixed article or "nothing found".
pub struct MockScraper {
    article: Option<ScrapedArticle>,
    calls: AtomicUsize,
}

impl MockScraper {
    pub fn found(headline: &str, image: &[u8]) -> Self {
        Self {
            article: Some(ScrapedArticle {
                headline: headline.to_string(),
                image: image.to_vec(),
                image_url: "https://example.com/lead.jpg".to_string(),
            }),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn nothing() -> Self {
        Self {
            article: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ArticleScraper for MockScraper {
    fn scrape<'a>(&'a self, _url: &'a str) -> BoxFuture<'a, Result<ScrapedArticle, ScrapeError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = self.article.clone().ok_or(ScrapeError::MissingHeadline);
        Box::pin(async move { result })
    }
}
