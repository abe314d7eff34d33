use std::sync::Arc;

use crate::{metrics::RelayMetrics, relay::ChatRelay};

#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<ChatRelay>,
    pub metrics: Arc<RelayMetrics>,
}

impl AppState {
    pub fn new(relay: Arc<ChatRelay>, metrics: Arc<RelayMetrics>) -> Self {
        Self { relay, metrics }
    }
}
