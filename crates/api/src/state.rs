use std::sync::Arc;

use reelsmith_pipeline::PipelineOrchestrator;

use crate::config::ServerConfig;
use crate::registry::RunRegistry;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: everything is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Pipeline orchestrator shared by every run.
    pub orchestrator: Arc<PipelineOrchestrator>,
    /// Runs known to this process.
    pub runs: Arc<RunRegistry>,
}
