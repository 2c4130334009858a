//! WebSocket subscription to the relayer.

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use shared::{ClientMessage, Event};

use super::backoff::{Backoff, BackoffConfig};
use crate::config::ClientConfig;
use crate::error::ClientError;

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Connection state of a [`Subscription`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting { attempt: u32 },
    /// `generation` increases on every successful (re)connect; a jump means
    /// events may have been missed and the caller should refetch.
    Connected { generation: u64 },
    Closed,
}

/// Handle to a live subscription. Dropping it closes the connection.
pub struct Subscription {
    outbound: mpsc::Sender<String>,
    status: watch::Receiver<ConnectionStatus>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Queue an application message for the relayer. Messages sent while
    /// disconnected go out once the connection opens, after the subscribe frame.
    /// Fails with [`ClientError::QueueFull`] when `send_queue_size` messages are
    /// already waiting.
    pub fn send<T: Serialize>(&self, message: &T) -> Result<(), ClientError> {
        let text = serde_json::to_string(message)?;
        self.outbound.try_send(text).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ClientError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => ClientError::Closed,
        })
    }

    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    /// Wait for the next `Connected` state and return its generation.
    pub async fn wait_for_connection(&self) -> Result<u64, ClientError> {
        let mut status = self.status.clone();
        loop {
            match *status.borrow_and_update() {
                ConnectionStatus::Connected { generation } => return Ok(generation),
                ConnectionStatus::Closed => return Err(ClientError::Closed),
                ConnectionStatus::Connecting { .. } => {}
            }
            status.changed().await.map_err(|_| ClientError::Closed)?;
        }
    }

    /// Close the connection and wait for the background task to finish.
    pub async fn close(mut self) {
        self.shutdown.send_replace(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

/// Subscribe to `user_id`'s events. `on_message` runs on the subscription's
/// task for every event that parses; anything else is logged and dropped.
///
/// Must be called within a tokio runtime.
pub fn subscribe<F>(config: &ClientConfig, user_id: impl Into<String>, on_message: F) -> Subscription
where
    F: FnMut(Event) + Send + 'static,
{
    let (outbound, outbound_rx) = mpsc::channel(config.send_queue_size.max(1));
    let (status_tx, status) = watch::channel(ConnectionStatus::Connecting { attempt: 0 });
    let (shutdown, shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(run(
        config.ws_url.clone(),
        user_id.into(),
        config.backoff,
        on_message,
        outbound_rx,
        status_tx,
        shutdown_rx,
    ));

    Subscription {
        outbound,
        status,
        shutdown,
        task: Some(task),
    }
}

enum SessionEnd {
    Shutdown,
    Dropped(String),
}

async fn run<F>(
    url: String,
    user_id: String,
    backoff: BackoffConfig,
    mut on_message: F,
    mut outbound: mpsc::Receiver<String>,
    status: watch::Sender<ConnectionStatus>,
    mut shutdown: watch::Receiver<bool>,
) where
    F: FnMut(Event) + Send + 'static,
{
    let mut backoff = Backoff::new(backoff);
    let mut generation = 0u64;

    loop {
        if *shutdown.borrow() {
            break;
        }
        status.send_replace(ConnectionStatus::Connecting {
            attempt: backoff.attempt(),
        });
        let connected = tokio::select! {
            res = connect_async(url.as_str()) => res,
            _ = shutdown.changed() => break,
        };
        match connected {
            Ok((ws, _)) => {
                generation += 1;
                backoff.reset();
                tracing::info!(user_id = %user_id, generation, "Connected to relayer");
                status.send_replace(ConnectionStatus::Connected { generation });
                match run_session(ws, &user_id, &mut on_message, &mut outbound, &mut shutdown).await
                {
                    SessionEnd::Shutdown => break,
                    SessionEnd::Dropped(reason) => {
                        tracing::warn!(user_id = %user_id, reason = %reason, "Connection lost");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Connect failed");
            }
        }

        let Some(delay) = backoff.next_delay() else {
            tracing::warn!(user_id = %user_id, attempts = backoff.attempt(), "Giving up on relayer");
            break;
        };
        tracing::debug!(user_id = %user_id, ?delay, "Reconnecting");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }
    }

    // refuse further sends before reporting Closed
    drop(outbound);
    status.send_replace(ConnectionStatus::Closed);
}

async fn run_session<F>(
    ws: WsStream,
    user_id: &str,
    on_message: &mut F,
    outbound: &mut mpsc::Receiver<String>,
    shutdown: &mut watch::Receiver<bool>,
) -> SessionEnd
where
    F: FnMut(Event),
{
    let (mut ws_tx, mut ws_rx) = ws.split();

    // Subscribe must be the first frame on every connection
    let subscribe = match serde_json::to_string(&ClientMessage::subscribe(user_id)) {
        Ok(s) => s,
        Err(e) => return SessionEnd::Dropped(e.to_string()),
    };
    if let Err(e) = ws_tx.send(Message::Text(subscribe)).await {
        return SessionEnd::Dropped(e.to_string());
    }

    let mut outbound_open = true;
    loop {
        tokio::select! {
            inbound = ws_rx.next() => match inbound {
                Some(Ok(Message::Text(t))) => dispatch(&t, on_message),
                Some(Ok(Message::Close(frame))) => {
                    return SessionEnd::Dropped(format!("closed by relayer: {:?}", frame));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return SessionEnd::Dropped(e.to_string()),
                None => return SessionEnd::Dropped("stream ended".to_string()),
            },
            msg = outbound.recv(), if outbound_open => match msg {
                Some(text) => {
                    if let Err(e) = ws_tx.send(Message::Text(text)).await {
                        return SessionEnd::Dropped(e.to_string());
                    }
                }
                None => outbound_open = false,
            },
            _ = shutdown.changed() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                return SessionEnd::Shutdown;
            }
        }
    }
}

fn dispatch<F>(raw: &str, on_message: &mut F)
where
    F: FnMut(Event),
{
    match Event::parse(raw) {
        Ok(event) => on_message(event),
        Err(e) => {
            tracing::warn!(error = %e, "Dropping unparseable event");
        }
    }
}
