//! Shared axum `State`: the orchestrator handle plus bootstrap settings and
//! persistence paths.

use std::path::PathBuf;
use std::sync::Arc;

use sorter_common::config::BootstrapConfig;
use sorter_core::SorterHandle;

#[derive(Clone)]
pub struct ApiState {
    pub handle: Arc<SorterHandle>,
    pub bootstrap: Arc<BootstrapConfig>,
    pub config_dir: PathBuf,
}

impl ApiState {
    pub fn new(handle: Arc<SorterHandle>, bootstrap: BootstrapConfig, config_dir: PathBuf) -> Self {
        Self {
            handle,
            bootstrap: Arc::new(bootstrap),
            config_dir,
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join("config.json")
    }

    pub fn sort_log_path(&self) -> PathBuf {
        self.config_dir.join("sort_log.json")
    }
}
