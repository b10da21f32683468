use std::sync::Arc;

use crate::config::Config;
use crate::error::StoreError;
use crate::pipeline::aggregate::MaxSpeedPolicy;
use crate::pipeline::ingest::IngestService;
use crate::store::DayLogStore;

#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    ingest: IngestService,
    max_speed: Arc<dyn MaxSpeedPolicy>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, StoreError> {
        let store = DayLogStore::open(config.data_dir.clone())?;
        tracing::info!("Fix logs stored in {}", store.dir().display());

        Ok(Self {
            max_speed: config.max_speed_policy(),
            config: Arc::new(config),
            ingest: IngestService::new(Arc::new(store)),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn ingest(&self) -> &IngestService {
        &self.ingest
    }

    pub fn max_speed_policy(&self) -> Arc<dyn MaxSpeedPolicy> {
        Arc::clone(&self.max_speed)
    }
}
