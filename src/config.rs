use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "FactLens";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8000";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_LLM_MODEL: &str = "llama3.2";
pub const DEFAULT_GROQ_MODEL: &str = "llama-3.3-70b-versatile";
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_OCR_MODEL: &str = "llava";

/// Page and image fetches during URL scraping.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 15;
/// Vision OCR call. Slow local models can raise it via
/// `FACTLENS_OCR_TIMEOUT_SECS`.
pub const DEFAULT_OCR_TIMEOUT_SECS: u64 = 15;

/// Upload limit for `POST /predict` (multipart overhead included).
pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;
/// Largest article image the scraper will download.
pub const MAX_SCRAPED_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Default `tracing` filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "factlens_lib=info,factlens=info,tower_http=warn"
}

/// Get the application data directory.
/// ~/FactLens/ on all platforms, falling back to the working directory
/// when no home directory can be determined.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(APP_NAME))
        .unwrap_or_else(|| PathBuf::from(APP_NAME))
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Which provider writes the explanations.
#[derive(Debug, Clone, PartialEq)]
pub enum LlmProvider {
    /// Local Ollama instance.
    Ollama { base_url: String, model: String },
    /// Groq's OpenAI-compatible chat completions API.
    Groq { api_key: String, model: String },
}

/// Runtime configuration for the scan service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub model_dir: PathBuf,
    pub db_path: PathBuf,
    pub stats_path: PathBuf,
    pub ollama_url: String,
    pub ocr_model: String,
    pub llm: LlmProvider,
    pub http_timeout: Duration,
    pub llm_timeout: Duration,
    pub ocr_timeout: Duration,
}

impl ServiceConfig {
    /// Build the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_raw = get("FACTLENS_BIND").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidValue {
                key: "FACTLENS_BIND",
                value: bind_raw.clone(),
            })?;

        let data_dir = get("FACTLENS_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(app_data_dir);
        let model_dir = get("FACTLENS_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("model"));
        let db_path = get("FACTLENS_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("factlens.db"));
        let stats_path = get("FACTLENS_STATS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| model_dir.join("model_stats.json"));

        let ollama_url = get("OLLAMA_URL").unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
        let ocr_model = get("FACTLENS_OCR_MODEL").unwrap_or_else(|| DEFAULT_OCR_MODEL.to_string());

        let llm = match get("GROQ_API_KEY") {
            Some(api_key) => LlmProvider::Groq {
                api_key,
                model: get("GROQ_MODEL").unwrap_or_else(|| DEFAULT_GROQ_MODEL.to_string()),
            },
            None => LlmProvider::Ollama {
                base_url: ollama_url.clone(),
                model: get("FACTLENS_LLM_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            },
        };

        Ok(Self {
            bind_addr,
            data_dir,
            model_dir,
            db_path,
            stats_path,
            ollama_url,
            ocr_model,
            llm,
            http_timeout: seconds(&get, "FACTLENS_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)?,
            llm_timeout: seconds(&get, "FACTLENS_LLM_TIMEOUT_SECS", DEFAULT_LLM_TIMEOUT_SECS)?,
            ocr_timeout: seconds(&get, "FACTLENS_OCR_TIMEOUT_SECS", DEFAULT_OCR_TIMEOUT_SECS)?,
        })
    }
}

fn seconds<G>(get: &G, key: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(Duration::from_secs(default)),
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
            _ => Err(ConfigError::InvalidValue { key, value: raw }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<ServiceConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServiceConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn app_data_dir_ends_with_app_name() {
        assert!(app_data_dir().ends_with("FactLens"));
    }

    #[test]
    fn defaults_apply_when_env_is_empty() {
        let config = config_from(&[("FACTLENS_DATA_DIR", "/tmp/fl")]).unwrap();
        assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(config.model_dir, PathBuf::from("/tmp/fl/model"));
        assert_eq!(config.db_path, PathBuf::from("/tmp/fl/factlens.db"));
        assert_eq!(
            config.stats_path,
            PathBuf::from("/tmp/fl/model/model_stats.json")
        );
        assert_eq!(config.http_timeout, Duration::from_secs(10));
        assert_eq!(config.llm_timeout, Duration::from_secs(15));
        assert_eq!(config.ocr_timeout, Duration::from_secs(15));
        assert_eq!(
            config.llm,
            LlmProvider::Ollama {
                base_url: DEFAULT_OLLAMA_URL.into(),
                model: DEFAULT_LLM_MODEL.into(),
            }
        );
    }

    #[test]
    fn groq_key_selects_groq_provider() {
        let config = config_from(&[("GROQ_API_KEY", "gsk_test")]).unwrap();
        assert_eq!(
            config.llm,
            LlmProvider::Groq {
                api_key: "gsk_test".into(),
                model: DEFAULT_GROQ_MODEL.into(),
            }
        );
    }

    #[test]
    fn blank_values_count_as_unset() {
        let config = config_from(&[("GROQ_API_KEY", "  "), ("FACTLENS_BIND", "")]).unwrap();
        assert!(matches!(config.llm, LlmProvider::Ollama { .. }));
        assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND_ADDR);
    }

    #[test]
    fn invalid_bind_address_is_rejected() {
        let err = config_from(&[("FACTLENS_BIND", "not-an-addr")]).unwrap_err();
        assert!(err.to_string().contains("FACTLENS_BIND"));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        assert!(config_from(&[("FACTLENS_LLM_TIMEOUT_SECS", "0")]).is_err());
        assert!(config_from(&[("FACTLENS_OCR_TIMEOUT_SECS", "abc")]).is_err());
    }

    #[test]
    fn explicit_timeouts_override_defaults() {
        let config = config_from(&[("FACTLENS_HTTP_TIMEOUT_SECS", "12")]).unwrap();
        assert_eq!(config.http_timeout, Duration::from_secs(12));
    }

    #[test]
    fn app_name_is_factlens() {
        assert_eq!(APP_NAME, "FactLens");
    }
}
