//! Ops endpoint: liveness, per-source polling status and Prometheus metrics.

pub mod health;

use std::sync::Arc;

use axum::{routing::get, Router};

use crate::metrics::HarvestMetrics;
use crate::sources::DataSource;

#[derive(Clone)]
pub struct OpsState {
    pub sources: Arc<Vec<Arc<dyn DataSource>>>,
    pub metrics: Arc<HarvestMetrics>,
}

pub fn create_ops_router(state: OpsState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/sources", get(health::sources))
        .route("/metrics", get(health::metrics))
        .with_state(state)
}
