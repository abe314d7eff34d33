pub mod config;
pub mod errors;
pub mod handlers;
pub mod identity;
pub mod inference;
pub mod metrics;
pub mod models;
pub mod normalize;
pub mod relay;
pub mod state;

use std::sync::Arc;

use axum::{
    routing::{any, get},
    Router,
};
use config::RelayConfig;
use metrics::RelayMetrics;
use relay::ChatRelay;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

pub fn build_state(config: RelayConfig) -> Result<state::AppState, std::io::Error> {
    let missing = config.missing_settings();
    if !missing.is_empty() {
        warn!(
            missing = %missing.join(","),
            "relay is missing credentials; chat requests will fail until they are set"
        );
    }

    let metrics = Arc::new(RelayMetrics::new());
    let relay = ChatRelay::from_config(config, metrics.clone()).map_err(std::io::Error::other)?;
    info!(
        profile = %relay.config().profile,
        model = %relay.config().model_id,
        endpoint = %relay.config().inference_url,
        token_source = relay.token_source(),
        "chat relay configured"
    );
    Ok(state::AppState::new(Arc::new(relay), metrics))
}

pub fn build_app(state: state::AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/healthz", get(handlers::healthz))
        .route("/metrics", get(handlers::metrics))
        .route(handlers::CHAT_PATH, any(handlers::chat))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
