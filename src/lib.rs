pub mod api;
pub mod config;
pub mod core_state;
pub mod db;
pub mod pipeline;

use std::sync::Arc;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::api::ApiContext;
use crate::config::{LlmProvider, ServiceConfig, MAX_SCRAPED_IMAGE_BYTES};
use crate::core_state::CapabilityRegistry;
use crate::pipeline::explain::ExplanationGenerator;
use crate::pipeline::llm::{ChatCompletionsClient, LlmClient, LlmError, OllamaClient};
use crate::pipeline::normalize::InputNormalizer;
use crate::pipeline::ocr::{OcrError, OllamaVisionOcr};
use crate::pipeline::orchestrator::ScanOrchestrator;
use crate::pipeline::recorder::{ScanRecorder, ScanStore};
use crate::pipeline::scraper::{HttpArticleScraper, ScrapeError};

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] db::DatabaseError),

    #[error("LLM client error: {0}")]
    Llm(#[from] LlmError),

    #[error("OCR engine error: {0}")]
    Ocr(#[from] OcrError),

    #[error("Scraper error: {0}")]
    Scraper(#[from] ScrapeError),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Signal handler error: {0}")]
    Signal(#[from] std::io::Error),
}

fn build_llm_client(config: &ServiceConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    let client: Arc<dyn LlmClient> = match &config.llm {
        LlmProvider::Ollama { base_url, model } => {
            tracing::info!(%base_url, %model, "Explanations via Ollama");
            Arc::new(OllamaClient::new(base_url, model, config.llm_timeout)?)
        }
        LlmProvider::Groq { api_key, model } => {
            tracing::info!(%model, "Explanations via Groq");
            Arc::new(ChatCompletionsClient::new(
                config::GROQ_BASE_URL,
                api_key,
                model,
                config.llm_timeout,
            )?)
        }
    };
    Ok(client)
}

/// Wire the production capabilities around an already-loaded registry
/// and store.
pub fn build_api_context(
    config: &ServiceConfig,
    registry: Arc<CapabilityRegistry>,
    store: Arc<dyn ScanStore>,
) -> Result<ApiContext, StartupError> {
    let ocr = OllamaVisionOcr::new(&config.ollama_url, &config.ocr_model, config.ocr_timeout)?;
    let scraper = HttpArticleScraper::new(config.http_timeout, MAX_SCRAPED_IMAGE_BYTES)?;
    let llm = build_llm_client(config)?;

    let orchestrator = ScanOrchestrator::new(
        registry,
        InputNormalizer::new(Arc::new(ocr), Arc::new(scraper)),
        ExplanationGenerator::new(llm),
        ScanRecorder::new(store),
    );
    Ok(ApiContext::new(
        Arc::new(orchestrator),
        config.stats_path.clone(),
    ))
}

/// Start the service and block until Ctrl-C.
pub async fn run() -> Result<(), StartupError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = ServiceConfig::from_env()?;
    tracing::info!(
        bind = %config.bind_addr,
        model_dir = %config.model_dir.display(),
        db = %config.db_path.display(),
        "Configuration loaded"
    );

    let store: Arc<dyn ScanStore> = Arc::new(db::SqliteScanStore::open(&config.db_path)?);

    let model_dir = config.model_dir.clone();
    let registry = tokio::task::spawn_blocking(move || core_state::load_capabilities(&model_dir))
        .await
        .map_err(|e| StartupError::Server(format!("capability loading task failed: {e}")))?;
    let registry = Arc::new(registry);

    let ctx = build_api_context(&config, registry.clone(), store)?;
    let server = api::start_server_on(ctx, config.bind_addr)
        .await
        .map_err(StartupError::Server)?;
    tracing::info!(addr = %server.addr, "Accepting scans");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");

    server.stop().await;
    registry.teardown();
    tracing::info!("{} stopped", config::APP_NAME);
    Ok(())
}
