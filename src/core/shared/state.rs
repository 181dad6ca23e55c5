use std::sync::Arc;

use crate::core::config::AppConfig;
use crate::store::{CrmStore, DatasetStore, MemoryStore};

pub struct AppState {
    pub config: AppConfig,
    pub crm: Arc<dyn CrmStore>,
    pub datasets: Arc<dyn DatasetStore>,
}

impl AppState {
    pub fn new(config: AppConfig, crm: Arc<dyn CrmStore>, datasets: Arc<dyn DatasetStore>) -> Self {
        Self {
            config,
            crm,
            datasets,
        }
    }

    /// Both ports backed by one fresh [`MemoryStore`].
    pub fn in_memory(config: AppConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::new(config, store.clone(), store)
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("storage", &self.config.storage)
            .finish_non_exhaustive()
    }
}
