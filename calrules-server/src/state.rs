use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use calrules_core::report::BatchReport;
use calrules_core::{CalrulesConfig, RuleStore};
use tokio::sync::RwLock;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RuleStore>,
    pub config: Arc<RwLock<CalrulesConfig>>,
    /// Where `PUT /api/settings` persists changes. `None` keeps them in memory.
    pub config_path: Option<PathBuf>,
    pub last_report: Arc<RwLock<Option<BatchReport>>>,
}

impl AppState {
    pub fn new(config: CalrulesConfig, store: Arc<dyn RuleStore>) -> Self {
        AppState {
            store,
            config: Arc::new(RwLock::new(config)),
            config_path: None,
            last_report: Arc::new(RwLock::new(None)),
        }
    }

    /// State backed by the user's config file, rules directory and last
    /// saved report.
    pub fn load() -> Result<Self> {
        let config_path = CalrulesConfig::config_path()?;
        let config = CalrulesConfig::load()?;
        let store = Arc::new(config.rule_store());
        let last_report = BatchReport::load_last(&config.state_path())?;

        let mut state = AppState::new(config, store);
        state.config_path = Some(config_path);
        state.last_report = Arc::new(RwLock::new(last_report));
        Ok(state)
    }

    /// A copy of the current settings, so long runs never hold the lock.
    pub async fn config(&self) -> CalrulesConfig {
        self.config.read().await.clone()
    }
}
