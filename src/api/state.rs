use std::sync::Arc;

use crate::config::{Config, ConfigError};
use crate::fetch::{FetchPolicy, Fetcher};
use crate::observability::Metrics;
use crate::platform::ContainerId;
use crate::pool::Pool;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: Arc<Pool>,
    pub fetcher: Arc<Fetcher>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// Wire a started pool into the fetch pipeline
    pub fn new(config: Config, pool: Arc<Pool>) -> Result<Self, ConfigError> {
        let container = config
            .platform
            .container_id
            .parse::<ContainerId>()
            .map_err(|e| ConfigError::ValidationError(e.into()))?;
        let metrics = Arc::new(Metrics::new());
        let fetcher = Fetcher::new(
            pool.clone(),
            container,
            FetchPolicy::from_config(&config),
            metrics.clone(),
        );

        Ok(Self {
            config: Arc::new(config),
            pool,
            fetcher: Arc::new(fetcher),
            metrics,
        })
    }
}
