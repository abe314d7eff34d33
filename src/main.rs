use std::net::SocketAddr;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use watsonx_chat_relay::config::RelayConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dotenv = dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,watsonx_chat_relay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Some(path) = dotenv {
        info!(path = %path.display(), "loaded environment file");
    }

    let config = RelayConfig::from_env().map_err(std::io::Error::other)?;
    let port = config.port;
    let state = watsonx_chat_relay::build_state(config)?;
    let app = watsonx_chat_relay::build_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "chat relay listening");

    axum::serve(listener, app).await?;
    Ok(())
}
