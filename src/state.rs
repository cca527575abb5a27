use std::sync::Arc;

use calmerge_core::{Aggregator, CalMergeResult, MergerConfig};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    // The aggregator owns the source cache, so it must outlive single requests
    aggregator: Arc<Aggregator>,
}

impl AppState {
    pub fn new(config: &MergerConfig) -> CalMergeResult<Self> {
        Ok(AppState {
            aggregator: Arc::new(Aggregator::from_config(config)?),
        })
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }
}
