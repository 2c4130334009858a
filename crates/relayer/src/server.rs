//! Relay service lifecycle: bind, serve, stop.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::api::{self, AppState};
use crate::config::Config;
use crate::relay::RelayState;

/// A running relay. Hand out [`RelayServer::relay`] to whatever publishes events.
pub struct RelayServer {
    local_addr: SocketAddr,
    relay: Arc<RelayState>,
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<std::io::Result<()>>,
}

impl RelayServer {
    pub async fn start(config: Config) -> anyhow::Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let relay = Arc::new(RelayState::new(config.delivery_mode));
        let app = api::router(AppState::new(relay.clone(), config.clone()))?;

        let listener = tokio::net::TcpListener::bind(config.bind_addr())
            .await
            .with_context(|| format!("bind {}", config.bind_addr()))?;
        let local_addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
        });

        tracing::info!(
            addr = %local_addr,
            delivery_mode = config.delivery_mode.as_str(),
            "Relayer listening"
        );
        Ok(Self {
            local_addr,
            relay,
            shutdown_tx,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn relay(&self) -> Arc<RelayState> {
        self.relay.clone()
    }

    /// Close every WebSocket, then stop accepting and wait for the server task.
    pub async fn stop(self) -> anyhow::Result<()> {
        self.relay.shutdown();
        let _ = self.shutdown_tx.send(());
        self.task.await.context("server task")??;
        tracing::info!("Relayer stopped");
        Ok(())
    }
}
