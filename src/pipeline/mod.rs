pub mod classifier;
pub mod explain;
pub mod llm;
pub mod normalize;
pub mod ocr;
pub mod orchestrator;
pub mod recorder;
pub mod scraper;
pub mod types;
