//! Relay subscriber CLI.
//!
//! Optional env: RELAYER_WS_URL, RELAYER_URL, PUBLISH_API_KEY, BACKOFF_INITIAL_MS,
//! BACKOFF_MAX_MS, RUST_LOG

use clap::Parser;
use subscriber::{cli, relay_client, ClientConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = cli::Cli::parse();
    let config = ClientConfig::from_env();

    match cli.command {
        cli::Commands::Listen { user_id } => {
            let subscription = relay_client::subscribe(&config, user_id, |event| {
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{}", line),
                    Err(e) => tracing::warn!(error = %e, "failed to print event"),
                }
            });
            tokio::signal::ctrl_c().await?;
            subscription.close().await;
        }
        cli::Commands::Publish {
            user_id,
            kind,
            payload,
        } => {
            let event = cli::build_event(&user_id, &kind, &payload)?;
            relay_client::Publisher::new(&config)
                .publish(&event)
                .await
                .map_err(|e| anyhow::anyhow!("Publish failed: {}", e))?;
            println!("Published {} event for {}", event.kind(), event.user_id);
        }
    }

    Ok(())
}
