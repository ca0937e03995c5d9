//! Shared application state for the pushprism gateway.

use std::sync::Arc;

use pushprism_core::{Aggregates, ObservabilitySink};

use crate::config::GatewayConfig;
use crate::obs::AggregatorMetrics;

#[derive(Clone)]
pub struct AppState {
    aggregates: Arc<Aggregates>,
    metrics: Arc<AggregatorMetrics>,
}

impl AppState {
    /// Build both store sides from the aggregation section, reporting into
    /// one shared metrics registry.
    pub fn new(cfg: &GatewayConfig) -> Self {
        let metrics = Arc::new(AggregatorMetrics::default());
        let sink: Arc<dyn ObservabilitySink> = metrics.clone();
        let aggregates = Arc::new(Aggregates::new(
            cfg.aggregation.batch_interval(),
            cfg.aggregation.options(),
            sink,
        ));

        Self {
            aggregates,
            metrics,
        }
    }

    pub fn aggregates(&self) -> &Arc<Aggregates> {
        &self.aggregates
    }

    pub fn metrics(&self) -> &AggregatorMetrics {
        &self.metrics
    }
}
