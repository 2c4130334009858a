//! Payment event relayer — HTTP + WebSocket backend.
//!
//! Optional env: HOST, PORT (or WEBSOCKET_PORT), PUBLISH_API_KEY, DELIVERY_MODE,
//! OUTBOUND_QUEUE_SIZE, PING_INTERVAL_SECS, WS_CONNECT_BURST, RUST_LOG

use relayer::{config, RelayServer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = config::Config::from_env().map_err(|e| anyhow::anyhow!("config: {}", e))?;
    if config.publish_api_key.is_none() {
        tracing::warn!("PUBLISH_API_KEY not set, /api/events accepts unauthenticated events");
    }

    let server = RelayServer::start(config).await?;
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    server.stop().await
}
