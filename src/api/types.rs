//! Shared state for the scan API router.

use std::path::PathBuf;
use std::sync::Arc;

use crate::pipeline::orchestrator::ScanOrchestrator;

/// Most history entries returned by `/history`.
pub const HISTORY_LIMIT: usize = 10;

#[derive(Clone)]
pub struct ApiContext {
    pub orchestrator: Arc<ScanOrchestrator>,
    /// Training metadata written by the model training job.
    pub stats_path: Arc<PathBuf>,
}

impl ApiContext {
    pub fn new(orchestrator: Arc<ScanOrchestrator>, stats_path: PathBuf) -> Self {
        Self {
            orchestrator,
            stats_path: Arc::new(stats_path),
        }
    }
}
