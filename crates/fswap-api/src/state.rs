//! Application state.

use std::sync::Arc;

use fswap_progress::ProgressChannel;
use fswap_worker::JobExecutor;

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub executor: Arc<JobExecutor>,
    pub progress: ProgressChannel,
}

impl AppState {
    pub fn new(config: ApiConfig, executor: Arc<JobExecutor>) -> Self {
        let progress = executor.progress().clone();
        Self {
            config,
            executor,
            progress,
        }
    }
}
