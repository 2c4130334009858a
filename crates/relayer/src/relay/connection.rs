//! One WebSocket connection: subscribe handling, outbound queue, keepalive.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use shared::ClientMessage;

use super::{ConnectionId, OutboundSender, RelayState};
use crate::config::DeliveryMode;

/// Registration state of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Open, waiting for a subscribe message.
    Unregistered,
    /// Mapped to a user in the registry.
    Registered(String),
    Closed,
}

/// Per-connection handler. Owns the connection's place in the registry and
/// removes it on close (or drop).
pub struct Connection {
    id: ConnectionId,
    state: ConnectionState,
    tx: OutboundSender,
    relay: Arc<RelayState>,
}

impl Connection {
    pub fn new(relay: Arc<RelayState>, tx: OutboundSender) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: ConnectionState::Unregistered,
            tx,
            relay,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Handle one inbound text frame. Malformed input is logged and dropped;
    /// it never closes the connection.
    pub fn on_message(&mut self, raw: &str) {
        match ClientMessage::parse(raw) {
            Ok(Some(ClientMessage::Subscribe { user_id })) => self.subscribe(user_id),
            Ok(None) => {
                tracing::debug!(conn_id = %self.id, "ignoring non-subscribe message");
            }
            Err(e) => {
                tracing::warn!(conn_id = %self.id, error = %e, "dropping malformed message");
            }
        }
    }

    fn subscribe(&mut self, user_id: String) {
        match &self.state {
            ConnectionState::Unregistered => {
                self.relay.register(&user_id, self.id, self.tx.clone());
                self.state = ConnectionState::Registered(user_id);
            }
            ConnectionState::Registered(current) if *current == user_id => {
                // in latest mode a repeat subscribe takes the entry back from a newer tab
                if self.relay.mode() == DeliveryMode::Latest {
                    self.relay.register(&user_id, self.id, self.tx.clone());
                } else {
                    tracing::debug!(conn_id = %self.id, user_id = %current, "already subscribed");
                }
            }
            ConnectionState::Registered(current) => {
                tracing::warn!(
                    conn_id = %self.id,
                    user_id = %current,
                    requested = %user_id,
                    "rejecting subscribe under a different user"
                );
            }
            ConnectionState::Closed => {}
        }
    }

    pub fn on_close(&mut self) {
        if let ConnectionState::Registered(user_id) = &self.state {
            self.relay.unregister(user_id, self.id);
        }
        self.state = ConnectionState::Closed;
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.on_close();
    }
}

/// Drive a WebSocket until the peer goes away or the relay shuts down.
pub async fn serve_socket(
    socket: WebSocket,
    relay: Arc<RelayState>,
    queue_size: usize,
    ping_interval: Duration,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(queue_size);
    let mut conn = Connection::new(relay.clone(), tx);
    let mut shutdown = relay.shutdown_signal();

    let mut ping = tokio::time::interval(ping_interval);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ping.tick().await;

    tracing::debug!(conn_id = %conn.id(), "connection opened");

    if *shutdown.borrow() {
        let _ = ws_tx.send(Message::Close(None)).await;
        return;
    }

    loop {
        tokio::select! {
            inbound = ws_rx.next() => match inbound {
                Some(Ok(Message::Text(t))) => conn.on_message(t.as_str()),
                Some(Ok(Message::Binary(b))) => match std::str::from_utf8(&b) {
                    Ok(s) => conn.on_message(s),
                    Err(_) => {
                        tracing::warn!(conn_id = %conn.id(), "dropping non-utf8 binary frame");
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!(conn_id = %conn.id(), reason = ?frame, "peer closed");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(conn_id = %conn.id(), error = %e, "receive error");
                    break;
                }
                None => break,
            },
            outbound = rx.recv() => {
                let Some(json) = outbound else { break };
                if let Err(e) = ws_tx.send(Message::Text(json.into())).await {
                    tracing::debug!(conn_id = %conn.id(), error = %e, "send failed");
                    break;
                }
            }
            _ = ping.tick() => {
                if ws_tx.send(Message::Ping(axum::body::Bytes::new())).await.is_err() {
                    break;
                }
            }
            _ = shutdown.changed() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
        }
    }

    conn.on_close();
    tracing::debug!(conn_id = %conn.id(), "connection closed");
}
